//! Scopes, oracles, and the configuration-to-evaluation lifecycle.
//!
//! A scope collects expressions into a shared graph while configuring.
//! Opening a nested scope clones the parent's graph, so the child inherits
//! everything registered so far and later additions stay isolated on both
//! sides. [`Engine::acquire`] hands out an [`Oracle`], a deferred handle
//! that stays valid across transformation because it names an acquisition
//! index rather than a node.
//!
//! Closing a scope runs the full pipeline: internal validation, the
//! pre-transform validator battery, transformation to fixpoint, the
//! post-transform battery, dense indexing, and pre-evaluation. The graph is
//! then discarded in favor of a frozen program; only closed scopes can serve
//! transactions.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::errors::{EngineError, LifecycleStage};
use crate::engine::eval::{
    EvalOutcome, FieldProvider, FrozenKind, FrozenNode, FrozenProgram, GraphEvalState,
};
use crate::engine::graph::{MergeGraph, NodeKind};
use crate::engine::registry::{CallRegistry, PreEvalContext};
use crate::engine::report::Reporter;
use crate::engine::transform::transform_to_fixpoint;
use crate::engine::validate::{validate_post, validate_pre};

/// Configuration directive selecting the debug report destination.
pub const DEBUG_REPORT_DIRECTIVE: &str = "VigilDebugReport";
/// Configuration directive defining a named template.
pub const DEFINE_DIRECTIVE: &str = "VigilDefine";

/// Identifier of a scope within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

/// Deferred handle to one acquired expression.
///
/// The token carries the scope it was acquired in plus the acquisition
/// index, never a node: transformation may rewrite or merge the underlying
/// expression arbitrarily without invalidating outstanding oracles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oracle {
    scope: ScopeId,
    index: usize,
}

impl Oracle {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Acquisition index within the scope, stable for the scope's lifetime.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Root-count ceilings for each ancestor, captured when the scope opened.
/// An ancestor oracle is visible here only if it was acquired before then.
type AncestorLimits = Vec<(ScopeId, usize)>;

struct ConfigState {
    graph: MergeGraph,
    ancestor_limits: AncestorLimits,
}

struct FrozenScope {
    program: FrozenProgram,
    /// Acquisition index to frozen node index.
    oracle_to_root: Vec<usize>,
    ancestor_limits: AncestorLimits,
}

enum ScopeState {
    Configuring(ConfigState),
    Closed(Arc<FrozenScope>),
}

struct ScopeSlot {
    name: String,
    state: ScopeState,
}

enum DebugTarget {
    Stderr,
    File(PathBuf),
}

/// The engine: a registry plus a tree of scopes.
pub struct Engine {
    registry: CallRegistry,
    scopes: Vec<ScopeSlot>,
    debug_report: Option<DebugTarget>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the standard call library.
    pub fn new() -> Self {
        Self::with_registry(CallRegistry::standard())
    }

    pub fn with_registry(registry: CallRegistry) -> Self {
        Self {
            registry,
            scopes: Vec::new(),
            debug_report: None,
        }
    }

    pub fn registry_mut(&mut self) -> &mut CallRegistry {
        &mut self.registry
    }

    pub fn scope_name(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0 as usize].name
    }

    /// Opens a scope. With a parent, the child starts from a copy of the
    /// parent's graph and inherits its oracles; the parent must still be
    /// configuring.
    pub fn open_scope(
        &mut self,
        name: &str,
        parent: Option<ScopeId>,
    ) -> Result<ScopeId, EngineError> {
        let config = match parent {
            None => ConfigState {
                graph: MergeGraph::new(),
                ancestor_limits: Vec::new(),
            },
            Some(parent_id) => {
                let parent_config = self.configuring(parent_id)?;
                let mut ancestor_limits = parent_config.ancestor_limits.clone();
                ancestor_limits.push((parent_id, parent_config.graph.root_count()));
                ConfigState {
                    graph: parent_config.graph.clone(),
                    ancestor_limits,
                }
            }
        };
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeSlot {
            name: name.to_string(),
            state: ScopeState::Configuring(config),
        });
        log::debug!("opened scope {} ({:?})", name, id);
        Ok(id)
    }

    /// Parses `expr`, merges it into the scope's graph, and returns an
    /// oracle for it. `origin` is recorded for diagnostics, typically
    /// "file:line" of the configuration directive.
    pub fn acquire(
        &mut self,
        scope: ScopeId,
        expr: &str,
        origin: &str,
    ) -> Result<Oracle, EngineError> {
        let ast = vigil_frontend::parse_expr(expr, origin)?;
        self.registry.check_ast(&ast)?;

        let config = self.configuring_mut(scope)?;
        let node = config.graph.insert_ast(&ast);
        config.graph.add_origin(node, origin);
        let index = config.graph.add_root(node);
        Ok(Oracle { scope, index })
    }

    /// Selects where scope-close debug reports go: `""` or `"-"` for
    /// stderr, anything else as a file path opened in append mode. May only
    /// be used once per engine.
    pub fn set_debug_report(&mut self, target: &str) -> Result<(), EngineError> {
        if self.debug_report.is_some() {
            return Err(EngineError::Directive(format!(
                "{} may only be used once",
                DEBUG_REPORT_DIRECTIVE
            )));
        }
        self.debug_report = Some(if target.is_empty() || target == "-" {
            DebugTarget::Stderr
        } else {
            DebugTarget::File(PathBuf::from(target))
        });
        Ok(())
    }

    /// Defines a template: `params` is the whitespace-separated parameter
    /// list and `body` an expression over `(ref 'param')` placeholders.
    pub fn define(
        &mut self,
        name: &str,
        params: &str,
        body: &str,
        origin: &str,
    ) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::Directive(format!(
                "{} requires a non-empty name",
                DEFINE_DIRECTIVE
            )));
        }
        let params: Vec<String> = params.split_whitespace().map(str::to_string).collect();
        let body = vigil_frontend::parse_expr(body, origin)?;
        self.registry
            .define_template(name, params, body, origin.to_string())
    }

    /// Closes a scope: validates, transforms to fixpoint, re-validates,
    /// indexes, and pre-evaluates. On success the scope's graph is gone and
    /// transactions can be created; on failure the scope stays configuring
    /// with its graph intact.
    pub fn close_scope(&mut self, scope: ScopeId) -> Result<(), EngineError> {
        let name = self.scopes[scope.0 as usize].name.clone();
        let (graph, ancestor_limits) = {
            let config = self.configuring(scope)?;
            (config.graph.clone(), config.ancestor_limits.clone())
        };
        log::debug!(
            "closing scope {}: {} roots, {} nodes",
            name,
            graph.root_count(),
            graph.len()
        );

        let mut reporter = Reporter::new();

        Self::internal_validate(&graph, &name, "before transformation")?;
        validate_pre(&graph, &self.registry, &mut reporter);
        reporter.finish_stage(LifecycleStage::PreTransformValidation)?;
        self.write_debug_report(&name, "Before Transform:", &graph)?;

        let graph = transform_to_fixpoint(&name, graph, &self.registry, &mut reporter)?;

        Self::internal_validate(&graph, &name, "after transformation")?;
        validate_post(&graph, &self.registry, &mut reporter);
        reporter.finish_stage(LifecycleStage::PostTransformValidation)?;
        self.write_debug_report(&name, "After Transform:", &graph)?;

        let frozen = self.freeze(&name, graph, ancestor_limits, &mut reporter)?;
        self.scopes[scope.0 as usize].state = ScopeState::Closed(Arc::new(frozen));
        Ok(())
    }

    /// Starts a transaction against a closed scope.
    pub fn transaction(&self, scope: ScopeId) -> Result<Transaction, EngineError> {
        let slot = &self.scopes[scope.0 as usize];
        match &slot.state {
            ScopeState::Configuring(_) => Err(EngineError::ScopeState(format!(
                "scope {} is still configuring; close it before evaluating",
                slot.name
            ))),
            ScopeState::Closed(frozen) => Ok(Transaction {
                scope,
                state: GraphEvalState::new(frozen.program.index_limit()),
                frozen: frozen.clone(),
            }),
        }
    }

    /// Runs the graph's own consistency report; failures are engine
    /// defects and abort the close immediately.
    fn internal_validate(graph: &MergeGraph, name: &str, when: &str) -> Result<(), EngineError> {
        let mut buf = Vec::new();
        let ok = graph.write_validation_report(&mut buf)?;
        if ok {
            return Ok(());
        }
        let report = String::from_utf8_lossy(&buf);
        for line in report.lines() {
            log::error!("scope {}: {}", name, line);
        }
        Err(EngineError::InternalConsistency(format!(
            "graph of scope {} failed validation {}",
            name, when
        )))
    }

    /// Assigns dense indices, runs every call's pre-evaluator, and builds
    /// the frozen program plus the oracle map.
    fn freeze(
        &self,
        name: &str,
        graph: MergeGraph,
        ancestor_limits: AncestorLimits,
        reporter: &mut Reporter,
    ) -> Result<FrozenScope, EngineError> {
        let indexing = graph.assign_indices();

        let mut nodes = Vec::with_capacity(indexing.index_limit());
        for &node in &indexing.order {
            let children = graph
                .children(node)
                .iter()
                .map(|child| {
                    indexing.index_of.get(child).copied().ok_or_else(|| {
                        EngineError::InternalConsistency(format!(
                            "scope {}: child #{} escaped indexing",
                            name, child.0
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let kind = match graph.kind(node) {
                NodeKind::Literal(value) => FrozenKind::Literal(value.clone()),
                NodeKind::Call(call_name) => {
                    let call = self.registry.get(call_name).cloned().ok_or_else(|| {
                        EngineError::InternalConsistency(format!(
                            "scope {}: call {} vanished from the registry",
                            name, call_name
                        ))
                    })?;
                    let ctx = PreEvalContext {
                        scope: name,
                        graph: &graph,
                        node,
                    };
                    let setup = match call.pre_eval(&ctx) {
                        Ok(setup) => setup,
                        Err(message) => {
                            reporter.error(&graph, Some(node), &message);
                            None
                        }
                    };
                    FrozenKind::Call { call, setup }
                }
            };
            nodes.push(FrozenNode { kind, children });
        }
        reporter.finish_stage(LifecycleStage::PreEvaluation)?;

        let mut oracle_to_root = Vec::with_capacity(graph.root_count());
        let mut roots = Vec::new();
        for &root in graph.roots() {
            let index = indexing.index_of.get(&root).copied().ok_or_else(|| {
                EngineError::InternalConsistency(format!(
                    "scope {}: root #{} escaped indexing",
                    name, root.0
                ))
            })?;
            oracle_to_root.push(index);
            if !roots.contains(&index) {
                roots.push(index);
            }
        }

        Ok(FrozenScope {
            program: FrozenProgram { nodes, roots },
            oracle_to_root,
            ancestor_limits,
        })
    }

    fn write_debug_report(
        &self,
        name: &str,
        stage: &str,
        graph: &MergeGraph,
    ) -> Result<(), EngineError> {
        let Some(target) = &self.debug_report else {
            return Ok(());
        };
        let mut out: Box<dyn Write> = match target {
            DebugTarget::Stderr => Box::new(io::stderr()),
            DebugTarget::File(path) => {
                Box::new(OpenOptions::new().create(true).append(true).open(path)?)
            }
        };
        writeln!(out, "== scope {} ==", name)?;
        writeln!(out, "{}", stage)?;
        graph.write_debug_report(&mut out)?;
        Ok(())
    }

    fn configuring(&self, scope: ScopeId) -> Result<&ConfigState, EngineError> {
        let slot = &self.scopes[scope.0 as usize];
        match &slot.state {
            ScopeState::Configuring(config) => Ok(config),
            ScopeState::Closed(_) => Err(EngineError::ScopeState(format!(
                "scope {} is already closed",
                slot.name
            ))),
        }
    }

    fn configuring_mut(&mut self, scope: ScopeId) -> Result<&mut ConfigState, EngineError> {
        let slot = &mut self.scopes[scope.0 as usize];
        match &mut slot.state {
            ScopeState::Configuring(config) => Ok(config),
            ScopeState::Closed(_) => Err(EngineError::ScopeState(format!(
                "scope {} is already closed",
                slot.name
            ))),
        }
    }
}

/// One unit of traffic being evaluated against a closed scope.
///
/// The transaction owns the memoization state: every oracle query within it
/// shares one slot array, so merged expressions evaluate once no matter how
/// many oracles cover them.
pub struct Transaction {
    scope: ScopeId,
    frozen: Arc<FrozenScope>,
    state: GraphEvalState,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Evaluates the expression behind `oracle` against this transaction.
    ///
    /// Oracles from the transaction's own scope are always valid; oracles
    /// from an ancestor scope are valid if acquired before this scope
    /// opened. Anything else is rejected.
    pub fn query(
        &mut self,
        oracle: Oracle,
        fields: &dyn FieldProvider,
    ) -> Result<EvalOutcome, EngineError> {
        if oracle.scope != self.scope {
            let limit = self
                .frozen
                .ancestor_limits
                .iter()
                .find(|(ancestor, _)| *ancestor == oracle.scope)
                .map(|(_, limit)| *limit);
            match limit {
                Some(limit) if oracle.index < limit => {}
                _ => {
                    return Err(EngineError::ScopeState(format!(
                        "oracle {:?}/{} is not visible from scope {:?}",
                        oracle.scope, oracle.index, self.scope
                    )));
                }
            }
        }
        let node = self
            .frozen
            .oracle_to_root
            .get(oracle.index)
            .copied()
            .ok_or_else(|| {
                EngineError::InternalConsistency(format!(
                    "oracle index {} outside root map",
                    oracle.index
                ))
            })?;
        let program = self.frozen.clone();
        Ok(self.state.eval(node, &program.program, fields))
    }

    /// Last computed value of the oracle, without evaluating.
    pub fn peek(&self, oracle: Oracle) -> Option<EvalOutcome> {
        let node = *self.frozen.oracle_to_root.get(oracle.index)?;
        let value = self.state.value(node)?.clone();
        Some(EvalOutcome {
            value,
            finished: self.state.is_finished(node),
        })
    }

    /// Renders the per-node evaluation state for diagnostics.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        for index in 0..self.frozen.program.index_limit() {
            let state = if self.state.is_finished(index) {
                "finished"
            } else if self.state.value(index).is_some() {
                "partial"
            } else {
                "unvisited"
            };
            let value = self
                .state
                .value(index)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "#{} {} {}", index, state, value);
        }
        out
    }
}
