//! Core engine for Vigil.
//!
//! Expressions arrive as s-expression text, merge into a shared graph that
//! deduplicates common structure, and are transformed to a fixpoint before a
//! scope freezes into an evaluation program. Each transaction then evaluates
//! lazily with memoization: expressions shared between rules run once.
//!
//! See [`engine::scope::Engine`] for the entry point.

#![forbid(unsafe_code)]

pub mod engine;

pub use engine::errors::{EngineError, LifecycleStage};
pub use engine::eval::{
    EvalContext, EvalOutcome, FieldLookup, FieldProvider, FrozenProgram, GraphEvalState,
};
pub use engine::graph::{MergeGraph, NodeId, NodeKind};
pub use engine::registry::{Call, CallRegistry, PreEvalContext, Rewrite, Setup, TransformContext};
pub use engine::scope::{
    DEBUG_REPORT_DIRECTIVE, DEFINE_DIRECTIVE, Engine, Oracle, ScopeId, Transaction,
};
pub use engine::value::Value;
