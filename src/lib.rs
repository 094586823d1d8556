//! # Vigil - Shared rule-expression DAG engine
//!
//! Vigil evaluates the conditions of web-traffic inspection rules. Rules
//! express their conditions as s-expressions; structurally identical
//! expressions and subexpressions, no matter which rules they come from,
//! merge into one shared graph and evaluate at most once per transaction.
//!
//! ## Architecture
//!
//! - **vigil-frontend**: s-expression parser and AST
//! - **vigil-core**: the engine — shared graph, fixpoint transformation,
//!   validation, scopes, oracles, and memoized evaluation
//!
//! ## Usage
//!
//! ```rust
//! use vigil::{Engine, FieldLookup, FieldProvider, Value};
//!
//! struct Fields;
//!
//! impl FieldProvider for Fields {
//!     fn field(&self, key: &str) -> FieldLookup {
//!         let value = match key {
//!             "REQUEST_METHOD" => Some(Value::Str("GET".into())),
//!             _ => None,
//!         };
//!         FieldLookup { value, finished: true }
//!     }
//! }
//!
//! let mut engine = Engine::new();
//! let scope = engine.open_scope("main", None)?;
//! let oracle = engine.acquire(scope, "(streq 'GET' (field 'REQUEST_METHOD'))", "rules:1")?;
//! engine.close_scope(scope)?;
//!
//! let mut txn = engine.transaction(scope)?;
//! let outcome = txn.query(oracle, &Fields)?;
//! assert_eq!(outcome.value, Value::Bool(true));
//! # Ok::<(), vigil::EngineError>(())
//! ```

#![forbid(unsafe_code)]

pub use vigil_core::{
    Call, CallRegistry, EngineError, EvalContext, EvalOutcome, FieldLookup, FieldProvider, Engine,
    GraphEvalState, LifecycleStage, MergeGraph, NodeId, NodeKind, Oracle, PreEvalContext, Rewrite,
    ScopeId, Setup, Transaction, TransformContext, Value, DEBUG_REPORT_DIRECTIVE, DEFINE_DIRECTIVE,
};
pub use vigil_frontend::{FrontendError, LiteralAst, SexprAst, parse_expr};
