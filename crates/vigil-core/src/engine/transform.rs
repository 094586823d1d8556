//! Fixpoint transformation of the expression graph.
//!
//! A pass rebuilds the whole graph bottom-up into a fresh arena: every node
//! is re-interned with its already-rebuilt children, each call gets one
//! chance to rewrite itself, and pure calls over all-literal arguments are
//! folded to their value. Because the rebuild goes through the same
//! hash-consing insert as initial construction, subtrees that only become
//! equal *after* a rewrite merge automatically. Root acquisition indices are
//! re-registered in order, so handles held by callers stay valid across
//! passes.
//!
//! The driver repeats passes until one reports no change. A defensive pass
//! ceiling turns a non-converging rewrite set into an error instead of an
//! endless loop.

use rustc_hash::FxHashMap;

use crate::engine::errors::{EngineError, LifecycleStage};
use crate::engine::eval::{EvalContext, EvalOutcome, FieldLookup, FieldProvider};
use crate::engine::graph::{Children, MergeGraph, NodeId, NodeKind};
use crate::engine::registry::{Call, CallRegistry, Rewrite, TransformContext};
use crate::engine::report::Reporter;
use crate::engine::value::Value;

/// Upper bound on transform passes before the engine assumes a rewrite set
/// that never converges.
pub(crate) const MAX_TRANSFORM_PASSES: usize = 100;

/// Folding evaluates pure calls outside any transaction; a field lookup from
/// that context is a call-implementation bug and yields nothing.
struct NoTransaction;

impl FieldProvider for NoTransaction {
    fn field(&self, _key: &str) -> FieldLookup {
        FieldLookup { value: None, finished: true }
    }
}

/// Runs transform passes until fixpoint and returns the final graph.
pub(crate) fn transform_to_fixpoint(
    scope: &str,
    graph: MergeGraph,
    registry: &CallRegistry,
    reporter: &mut Reporter,
) -> Result<MergeGraph, EngineError> {
    let mut current = graph;
    for _pass in 0..MAX_TRANSFORM_PASSES {
        let (next, changed) = transform_pass(scope, &current, registry, reporter);
        reporter.finish_stage(LifecycleStage::Transform)?;
        current = next;
        if !changed {
            return Ok(current);
        }
    }
    reporter.error(
        &current,
        None,
        &format!("transformation did not converge after {} passes", MAX_TRANSFORM_PASSES),
    );
    reporter.finish_stage(LifecycleStage::Transform)?;
    Ok(current)
}

/// One full rebuild pass. Returns the new graph and whether any rewrite or
/// fold fired; an unchanged graph rebuilds isomorphically and reports false.
pub(crate) fn transform_pass(
    scope: &str,
    old: &MergeGraph,
    registry: &CallRegistry,
    reporter: &mut Reporter,
) -> (MergeGraph, bool) {
    let mut new = MergeGraph::new();
    let mut memo: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut changed = false;

    let order = old.traverse_down();

    // Child ids are strictly smaller than parent ids, so ascending id order
    // is bottom-up and the memo always has every child of the node at hand.
    let mut rebuild_order = order.clone();
    rebuild_order.sort_unstable();

    for &node in &rebuild_order {
        let new_children: Children = old
            .children(node)
            .iter()
            .map(|child| memo[child])
            .collect();

        let new_id = match old.kind(node) {
            NodeKind::Literal(value) => {
                new.insert_parts(NodeKind::Literal(value.clone()), Children::new())
            }
            NodeKind::Call(name) => {
                match registry.get(name) {
                    None => {
                        reporter.error(old, Some(node), &format!("unknown call: {}", name));
                        new.insert_parts(NodeKind::Call(name.clone()), new_children)
                    }
                    Some(call) => {
                        let call = call.clone();
                        let result = {
                            let ctx = TransformContext {
                                scope,
                                graph: &new,
                                children: &new_children,
                            };
                            call.transform(&ctx)
                        };
                        match result {
                            Err(message) => {
                                reporter.error(old, Some(node), &message);
                                new.insert_parts(NodeKind::Call(name.clone()), new_children)
                            }
                            Ok(Some(rewrite)) => {
                                changed = true;
                                build_rewrite(&mut new, &rewrite)
                            }
                            Ok(None) => {
                                let folded = if call.pure() {
                                    fold_literal_call(&new, &*call, &new_children)
                                } else {
                                    None
                                };
                                match folded {
                                    Some(value) => {
                                        changed = true;
                                        new.insert_parts(NodeKind::Literal(value), Children::new())
                                    }
                                    None => new
                                        .insert_parts(NodeKind::Call(name.clone()), new_children),
                                }
                            }
                        }
                    }
                }
            }
        };
        memo.insert(node, new_id);
    }

    for (index, &root) in old.roots().iter().enumerate() {
        new.restore_root(index, memo[&root]);
    }
    for &node in &order {
        let new_id = memo[&node];
        for origin in old.origins(node) {
            new.add_origin(new_id, origin.clone());
        }
    }

    (new, changed)
}

/// Materializes a rewrite in the graph under construction. `Existing` ids
/// already name nodes of that graph.
fn build_rewrite(graph: &mut MergeGraph, rewrite: &Rewrite) -> NodeId {
    match rewrite {
        Rewrite::Existing(id) => *id,
        Rewrite::Literal(value) => {
            graph.insert_parts(NodeKind::Literal(value.clone()), Children::new())
        }
        Rewrite::Call { name, args } => {
            let children: Children = args
                .iter()
                .map(|arg| build_rewrite(graph, arg))
                .collect();
            graph.insert_parts(NodeKind::Call(name.clone()), children)
        }
    }
}

/// Evaluates a pure call whose arguments are all literals. Returns the
/// folded value, or `None` when an argument is a call or the evaluation
/// declines to finish.
fn fold_literal_call(
    graph: &MergeGraph,
    call: &dyn Call,
    children: &[NodeId],
) -> Option<Value> {
    let mut args = Vec::with_capacity(children.len());
    for &child in children {
        match graph.kind(child) {
            NodeKind::Literal(value) => args.push(EvalOutcome::finished(value.clone())),
            NodeKind::Call(_) => return None,
        }
    }
    let outcome = call.eval(&EvalContext::new(&args, None, &NoTransaction));
    outcome.finished.then_some(outcome.value)
}
