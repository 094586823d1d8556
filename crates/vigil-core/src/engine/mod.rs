//! The expression graph engine: construction, transformation, and
//! per-transaction evaluation of shared policy expressions.

pub mod errors;
pub mod eval;
pub mod graph;
pub mod registry;
pub(crate) mod report;
pub mod scope;
pub(crate) mod stdlib;
pub(crate) mod transform;
pub(crate) mod validate;
pub mod value;
