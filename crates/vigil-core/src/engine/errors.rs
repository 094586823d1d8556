//! Error types for the Vigil engine.

use std::fmt;

use thiserror::Error;
use vigil_frontend::FrontendError;

/// Lifecycle stage that accumulated errors and aborted scope close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    PreTransformValidation,
    Transform,
    PostTransformValidation,
    PreEvaluation,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreTransformValidation => "pre-transform validation",
            Self::Transform => "DAG transformation",
            Self::PostTransformValidation => "post-transform validation",
            Self::PreEvaluation => "pre-evaluation",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can occur during configuration or query of the engine.
///
/// Validator findings are not raised individually; they are accumulated
/// through the reporter and surface here as a single [`EngineError::Lifecycle`]
/// once a stage finishes with a nonzero error count.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Syntax error in an expression.
    #[error(transparent)]
    Parse(#[from] FrontendError),

    /// An expression referenced a call name absent from the registry.
    #[error("unknown call: {name}")]
    UnknownCall { name: String },

    /// A call or template name was registered twice.
    #[error("duplicate definition: {name}")]
    DuplicateDefinition { name: String },

    /// A lifecycle stage finished with accumulated errors; see the log.
    #[error("errors occurred during {stage}; see above")]
    Lifecycle { stage: LifecycleStage },

    /// A configuration directive was misused.
    #[error("directive error: {0}")]
    Directive(String),

    /// An operation was issued in the wrong scope state, e.g. querying an
    /// oracle before its scope closed.
    #[error("scope state error: {0}")]
    ScopeState(String),

    /// The engine's own bookkeeping is inconsistent. Always a defect in the
    /// engine, never caused by user configuration.
    #[error("internal validation failure: {0}")]
    InternalConsistency(String),

    /// Writing a debug report failed.
    #[error("debug report i/o error: {0}")]
    Io(#[from] std::io::Error),
}
