//! # Vigil Frontend
//!
//! S-expression grammar, AST, and parse errors for Vigil rule expressions.
//!
//! This crate is purely syntactic: it turns text into a typed, unlinked
//! [`ast::SexprAst`] tree. Call-name resolution, graph interning, and
//! evaluation live in `vigil-core`.

#![forbid(unsafe_code)]

pub mod ast;
pub mod errors;
pub mod parser;

pub use ast::{LiteralAst, SexprAst};
pub use errors::FrontendError;
pub use parser::parse_expr;
