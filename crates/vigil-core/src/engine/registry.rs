//! Call registry: the pluggable mapping from call names to behavior.
//!
//! Built-in primitives and user-defined templates share one namespace;
//! registering a name twice is rejected, never overwritten. Template bodies
//! are parsed once at definition time, so expansion is pure substitution.

use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use vigil_frontend::ast::{LiteralAst, SexprAst};

use crate::engine::errors::EngineError;
use crate::engine::eval::{EvalContext, EvalOutcome};
use crate::engine::graph::{MergeGraph, NodeId, NodeKind};
use crate::engine::stdlib;
use crate::engine::value::Value;

/// Scope-invariant state a call's pre-evaluator computes once per scope.
pub type Setup = Box<dyn Any + Send + Sync>;

/// Replacement form a call's transform step hands back to the transformer.
///
/// `Existing` references a node already interned in the graph being built
/// (typically one of the rewritten call's own children), so template
/// expansion can splice call-site arguments into the body without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    Call { name: String, args: Vec<Rewrite> },
    Literal(Value),
    Existing(NodeId),
}

/// Context handed to a call's transform step. `graph` is the graph under
/// reconstruction and `children` are the node's already-rebuilt children.
pub struct TransformContext<'a> {
    pub scope: &'a str,
    pub graph: &'a MergeGraph,
    pub children: &'a [NodeId],
}

impl<'a> TransformContext<'a> {
    /// The i-th child's literal value, when it is a literal node.
    pub fn child_literal(&self, i: usize) -> Option<&Value> {
        match self.graph.kind(self.children[i]) {
            NodeKind::Literal(value) => Some(value),
            NodeKind::Call(_) => None,
        }
    }

    /// The i-th child's call name, when it is a call node.
    pub fn child_call(&self, i: usize) -> Option<&str> {
        match self.graph.kind(self.children[i]) {
            NodeKind::Call(name) => Some(name),
            NodeKind::Literal(_) => None,
        }
    }
}

/// Context handed to a call's pre-evaluation step at scope close.
pub struct PreEvalContext<'a> {
    /// Name the scope was bound to at open.
    pub scope: &'a str,
    pub graph: &'a MergeGraph,
    pub node: NodeId,
}

impl<'a> PreEvalContext<'a> {
    /// The i-th argument's literal value, when it is a literal node.
    pub fn arg_literal(&self, i: usize) -> Option<&Value> {
        let child = *self.graph.children(self.node).get(i)?;
        match self.graph.kind(child) {
            NodeKind::Literal(value) => Some(value),
            NodeKind::Call(_) => None,
        }
    }
}

/// Behavior of a named call: the seams the graph lifecycle drives.
///
/// Implementations must be cheap to share; the registry hands out `Arc`s and
/// the frozen program keeps one per call node.
pub trait Call: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum and optional maximum argument count.
    fn arity(&self) -> (usize, Option<usize>);

    /// Pure calls with all-literal arguments are folded to a literal by the
    /// transformer. Calls that consult the transaction must return false.
    fn pure(&self) -> bool {
        true
    }

    /// Attempt a local rewrite. `Ok(None)` means no change. An `Err` is
    /// reported against the node and aborts the transform stage.
    fn transform(&self, _ctx: &TransformContext<'_>) -> Result<Option<Rewrite>, String> {
        Ok(None)
    }

    /// One chance per scope to precompute setup state (e.g. resolve a field
    /// name once). An `Err` is reported and aborts scope close.
    fn pre_eval(&self, _ctx: &PreEvalContext<'_>) -> Result<Option<Setup>, String> {
        Ok(None)
    }

    /// Evaluation step: children have already been evaluated post-order.
    fn eval(&self, ctx: &EvalContext<'_>) -> EvalOutcome;

    /// True for user-defined templates, which must be gone after transform.
    fn is_template(&self) -> bool {
        false
    }
}

/// Registry mapping call names to behavior.
#[derive(Clone, Default)]
pub struct CallRegistry {
    calls: FxHashMap<String, Arc<dyn Call>>,
}

impl CallRegistry {
    /// An empty registry with no calls at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the standard library.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        stdlib::load(&mut registry).expect("standard library names are unique");
        registry
    }

    /// Registers a call. Fails if the name is already taken, by a built-in
    /// or a template alike.
    pub fn register(&mut self, call: Arc<dyn Call>) -> Result<(), EngineError> {
        let name = call.name().to_string();
        if self.calls.contains_key(&name) {
            return Err(EngineError::DuplicateDefinition { name });
        }
        self.calls.insert(name, call);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Call>> {
        self.calls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.calls.contains_key(name)
    }

    /// Verifies every call name in `ast` is registered.
    pub fn check_ast(&self, ast: &SexprAst) -> Result<(), EngineError> {
        if let SexprAst::Call { name, args } = ast {
            if !self.contains(name) {
                return Err(EngineError::UnknownCall { name: name.clone() });
            }
            for arg in args {
                self.check_ast(arg)?;
            }
        }
        Ok(())
    }

    /// Defines a named template over an already-parsed body.
    pub fn define_template(
        &mut self,
        name: &str,
        params: Vec<String>,
        body: SexprAst,
        origin: String,
    ) -> Result<(), EngineError> {
        self.check_ast(&body)?;
        self.register(Arc::new(Template {
            name: name.to_string(),
            params,
            body,
            origin,
        }))
    }
}

/// A user-defined macro: formal parameters plus a body expression whose
/// `(ref 'param')` placeholders are substituted with call-site arguments.
pub struct Template {
    name: String,
    params: Vec<String>,
    body: SexprAst,
    origin: String,
}

impl Template {
    fn expand(&self, body: &SexprAst, ctx: &TransformContext<'_>) -> Result<Rewrite, String> {
        if let SexprAst::Call { name, args } = body {
            if name == "ref" {
                let param = match args.as_slice() {
                    [SexprAst::Literal(LiteralAst::Str(param))] => param,
                    _ => {
                        return Err(format!(
                            "template {} ({}) has a ref without a literal string argument",
                            self.name, self.origin
                        ));
                    }
                };
                let position = self
                    .params
                    .iter()
                    .position(|p| p == param)
                    .ok_or_else(|| {
                        format!(
                            "template {} ({}) references unknown argument {}",
                            self.name, self.origin, param
                        )
                    })?;
                return Ok(Rewrite::Existing(ctx.children[position]));
            }
            let args = args
                .iter()
                .map(|arg| self.expand(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Rewrite::Call { name: name.clone(), args });
        }
        let SexprAst::Literal(lit) = body else {
            unreachable!("expression is a call or a literal");
        };
        Ok(Rewrite::Literal(Value::from(lit)))
    }
}

impl Call for Template {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (self.params.len(), Some(self.params.len()))
    }

    fn pure(&self) -> bool {
        false
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<Option<Rewrite>, String> {
        self.expand(&self.body, ctx).map(Some)
    }

    fn eval(&self, _ctx: &EvalContext<'_>) -> EvalOutcome {
        // Unexpanded templates are rejected by post-transform validation;
        // this step is unreachable in a closed scope.
        EvalOutcome::finished(Value::Null)
    }

    fn is_template(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_frontend::parse_expr;

    #[test]
    fn standard_registry_contains_the_stdlib() {
        let registry = CallRegistry::standard();
        for name in ["field", "streq", "and", "or", "not", "if", "eq", "gt", "ref"] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let mut registry = CallRegistry::standard();
        let err = registry
            .define_template("and", vec![], SexprAst::Literal(LiteralAst::Null), "t:1".into())
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDefinition { name } if name == "and"));
    }

    #[test]
    fn template_redefinition_is_rejected() {
        let mut registry = CallRegistry::standard();
        let body = parse_expr("(not (ref 'x'))", "t:2").unwrap();
        registry
            .define_template("deny", vec!["x".into()], body.clone(), "t:2".into())
            .unwrap();
        let err = registry
            .define_template("deny", vec!["x".into()], body, "t:3".into())
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDefinition { .. }));
    }

    #[test]
    fn check_ast_names_the_unknown_call() {
        let registry = CallRegistry::standard();
        let ast = parse_expr("(and (bogus 1) true)", "t:4").unwrap();
        let err = registry.check_ast(&ast).unwrap_err();
        assert!(matches!(err, EngineError::UnknownCall { name } if name == "bogus"));
    }

    #[test]
    fn template_body_with_unknown_call_is_rejected() {
        let mut registry = CallRegistry::standard();
        let body = parse_expr("(missing (ref 'x'))", "t:5").unwrap();
        let err = registry
            .define_template("t", vec!["x".into()], body, "t:5".into())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCall { .. }));
    }
}
