//! Graph validation, run before and after transformation.
//!
//! Findings go through the reporter so a single close attempt surfaces every
//! problem at once; the caller decides the stage outcome from the error
//! count.

use crate::engine::graph::{MergeGraph, NodeKind};
use crate::engine::registry::CallRegistry;
use crate::engine::report::Reporter;

/// Checks every reachable call node against the registry: the name must be
/// registered and the argument count within the call's declared arity.
pub(crate) fn validate_pre(graph: &MergeGraph, registry: &CallRegistry, reporter: &mut Reporter) {
    for node in graph.traverse_down() {
        let NodeKind::Call(name) = graph.kind(node) else {
            continue;
        };
        let Some(call) = registry.get(name) else {
            reporter.error(graph, Some(node), &format!("unknown call: {}", name));
            continue;
        };
        let argc = graph.children(node).len();
        let (min, max) = call.arity();
        if argc < min {
            reporter.error(
                graph,
                Some(node),
                &format!("{} takes at least {} arguments, got {}", name, min, argc),
            );
        } else if let Some(max) = max {
            if argc > max {
                reporter.error(
                    graph,
                    Some(node),
                    &format!("{} takes at most {} arguments, got {}", name, max, argc),
                );
            }
        }
    }
}

/// Re-runs the pre-transform checks on the rewritten graph and additionally
/// rejects anything transformation was required to remove: template calls
/// must have been expanded and `ref` never appears outside a template body.
pub(crate) fn validate_post(graph: &MergeGraph, registry: &CallRegistry, reporter: &mut Reporter) {
    validate_pre(graph, registry, reporter);
    for node in graph.traverse_down() {
        let NodeKind::Call(name) = graph.kind(node) else {
            continue;
        };
        if name == "ref" {
            reporter.error(graph, Some(node), "ref is only valid inside a template body");
            continue;
        }
        if let Some(call) = registry.get(name) {
            if call.is_template() {
                reporter.error(
                    graph,
                    Some(node),
                    &format!("template {} survived transformation", name),
                );
            }
        }
    }
}
