//! Per-transaction incremental evaluation with memoization.
//!
//! After a scope closes, its graph is frozen into a [`FrozenProgram`]: a flat
//! array of nodes addressed by the dense indices the indexer assigned. Each
//! transaction owns one [`GraphEvalState`], an array of slots with the same
//! layout. Evaluation is post-order and memoized: a `Finished` slot is never
//! recomputed within the transaction, while a `Partial` slot may be re-run by
//! a later query once more input has arrived.

use std::any::Any;
use std::sync::Arc;

use crate::engine::registry::{Call, Setup};
use crate::engine::value::Value;

/// The field-lookup capability a transaction supplies to the engine.
///
/// `finished` reports whether the field's value is final for this
/// transaction; a field backed by a still-streaming request body stays
/// unfinished and forces the nodes above it to stay `Partial`.
pub trait FieldProvider {
    fn field(&self, key: &str) -> FieldLookup;
}

/// Result of a field lookup.
#[derive(Debug, Clone)]
pub struct FieldLookup {
    pub value: Option<Value>,
    pub finished: bool,
}

/// Result of evaluating a node or querying an oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub value: Value,
    pub finished: bool,
}

impl EvalOutcome {
    pub fn finished(value: Value) -> Self {
        Self { value, finished: true }
    }

    pub fn partial(value: Value) -> Self {
        Self { value, finished: false }
    }
}

/// A node in the frozen evaluation layout.
pub struct FrozenNode {
    pub(crate) kind: FrozenKind,
    /// Child positions in the same frozen array.
    pub(crate) children: Vec<usize>,
}

pub(crate) enum FrozenKind {
    Literal(Value),
    Call {
        call: Arc<dyn Call>,
        /// Scope-invariant state the pre-evaluator computed once.
        setup: Option<Setup>,
    },
}

/// The read-only evaluation layout shared by every transaction of a scope.
pub struct FrozenProgram {
    /// Nodes by assigned index; `len()` is the index limit.
    pub(crate) nodes: Vec<FrozenNode>,
    /// Distinct root indices, in first-registration order.
    pub(crate) roots: Vec<usize>,
}

impl FrozenProgram {
    pub fn index_limit(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }
}

/// Context handed to a call's evaluation step.
pub struct EvalContext<'a> {
    args: &'a [EvalOutcome],
    setup: Option<&'a (dyn Any + Send + Sync)>,
    fields: &'a dyn FieldProvider,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(
        args: &'a [EvalOutcome],
        setup: Option<&'a (dyn Any + Send + Sync)>,
        fields: &'a dyn FieldProvider,
    ) -> Self {
        Self { args, setup, fields }
    }

    pub fn args(&self) -> &[EvalOutcome] {
        self.args
    }

    pub fn arg(&self, i: usize) -> &EvalOutcome {
        &self.args[i]
    }

    /// Typed view of the setup state the call's pre-evaluator stored.
    pub fn setup<T: 'static>(&self) -> Option<&T> {
        self.setup.and_then(|s| s.downcast_ref::<T>())
    }

    /// Forwarded field lookup on the current transaction.
    pub fn field(&self, key: &str) -> FieldLookup {
        self.fields.field(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SlotState {
    #[default]
    Unvisited,
    Partial,
    Finished,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    value: Option<Value>,
    state: SlotState,
}

/// Evaluation cache of one transaction: one slot per node index.
pub struct GraphEvalState {
    slots: Vec<Slot>,
}

impl GraphEvalState {
    pub fn new(index_limit: usize) -> Self {
        Self {
            slots: vec![Slot::default(); index_limit],
        }
    }

    /// Evaluates the node at `index` top-down with memoization.
    ///
    /// Children are evaluated first; the node's own evaluation step then
    /// decides its value and whether it is final for this transaction.
    pub fn eval(
        &mut self,
        index: usize,
        program: &FrozenProgram,
        fields: &dyn FieldProvider,
    ) -> EvalOutcome {
        if self.slots[index].state == SlotState::Finished {
            let value = self.slots[index].value.clone().unwrap_or(Value::Null);
            return EvalOutcome::finished(value);
        }

        let node = &program.nodes[index];
        let outcome = match &node.kind {
            FrozenKind::Literal(value) => EvalOutcome::finished(value.clone()),
            FrozenKind::Call { call, setup } => {
                let args: Vec<EvalOutcome> = node
                    .children
                    .iter()
                    .map(|&child| self.eval(child, program, fields))
                    .collect();
                let ctx = EvalContext {
                    args: &args,
                    setup: setup.as_deref(),
                    fields,
                };
                call.eval(&ctx)
            }
        };

        let slot = &mut self.slots[index];
        slot.value = Some(outcome.value.clone());
        slot.state = if outcome.finished {
            SlotState::Finished
        } else {
            SlotState::Partial
        };
        outcome
    }

    /// Last computed value of the node at `index`, if any.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.slots[index].value.as_ref()
    }

    pub fn is_finished(&self, index: usize) -> bool {
        self.slots[index].state == SlotState::Finished
    }
}
