//! Diagnostic reporting for the scope-close lifecycle.
//!
//! Validators, transforms, and pre-evaluators never raise individual errors;
//! they report them here. Each finding is logged with the offending node's
//! rendered expression, its origins, and the roots above it, so a rule author
//! can find every configuration line that contributed. A stage checks the
//! accumulated count when it finishes and aborts with a single error.

use log::Level;

use crate::engine::errors::{EngineError, LifecycleStage};
use crate::engine::graph::{MergeGraph, NodeId};

/// Accumulates findings for one lifecycle stage.
#[derive(Debug, Default)]
pub(crate) struct Reporter {
    errors: usize,
    warnings: usize,
}

impl Reporter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn error(&mut self, graph: &MergeGraph, node: Option<NodeId>, message: &str) {
        self.errors += 1;
        self.emit(Level::Error, graph, node, message);
    }

    pub(crate) fn warn(&mut self, graph: &MergeGraph, node: Option<NodeId>, message: &str) {
        self.warnings += 1;
        self.emit(Level::Warn, graph, node, message);
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors
    }

    pub(crate) fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Ends a stage: fails with a [`EngineError::Lifecycle`] if any errors
    /// accumulated, and resets the counters either way.
    pub(crate) fn finish_stage(&mut self, stage: LifecycleStage) -> Result<(), EngineError> {
        let errors = self.errors;
        let warnings = self.warnings;
        self.errors = 0;
        self.warnings = 0;
        if errors > 0 {
            log::error!("{}: {} error(s), {} warning(s)", stage, errors, warnings);
            Err(EngineError::Lifecycle { stage })
        } else {
            Ok(())
        }
    }

    fn emit(&self, level: Level, graph: &MergeGraph, node: Option<NodeId>, message: &str) {
        let Some(node) = node else {
            log::log!(level, "{}", message);
            return;
        };
        log::log!(level, "{}: {}", message, graph.render(node));
        for origin in graph.origins(node) {
            log::log!(level, "  origin: {}", origin);
        }
        for root in graph.roots_over(node) {
            log::log!(
                level,
                "  root {:?}: {}",
                graph.root_indices(root),
                graph.render(root)
            );
            for origin in graph.origins(root) {
                log::log!(level, "    root origin: {}", origin);
            }
        }
    }
}
