//! Standard call library: field access, comparisons, and boolean structure.
//!
//! Every builtin is a [`Builtin`] record of function pointers; [`load`]
//! registers them all. Pure builtins are constant-folded by the transformer
//! when all their arguments are literals, so the transform functions here
//! only handle the structural simplifications folding cannot see.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::engine::errors::EngineError;
use crate::engine::eval::{EvalContext, EvalOutcome};
use crate::engine::registry::{
    Call, CallRegistry, PreEvalContext, Rewrite, Setup, TransformContext,
};
use crate::engine::value::Value;

type TransformFn = fn(&TransformContext<'_>) -> Result<Option<Rewrite>, String>;
type PreEvalFn = fn(&PreEvalContext<'_>) -> Result<Option<Setup>, String>;
type EvalFn = fn(&EvalContext<'_>) -> EvalOutcome;

/// A built-in call defined by plain function pointers.
#[derive(Clone, Copy)]
pub(crate) struct Builtin {
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    pure: bool,
    transform: Option<TransformFn>,
    pre_eval: Option<PreEvalFn>,
    eval: EvalFn,
}

impl Call for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (self.min_args, self.max_args)
    }

    fn pure(&self) -> bool {
        self.pure
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<Option<Rewrite>, String> {
        match self.transform {
            Some(f) => f(ctx),
            None => Ok(None),
        }
    }

    fn pre_eval(&self, ctx: &PreEvalContext<'_>) -> Result<Option<Setup>, String> {
        match self.pre_eval {
            Some(f) => f(ctx),
            None => Ok(None),
        }
    }

    fn eval(&self, ctx: &EvalContext<'_>) -> EvalOutcome {
        (self.eval)(ctx)
    }
}

/// Registers the full standard library into `registry`.
pub(crate) fn load(registry: &mut CallRegistry) -> Result<(), EngineError> {
    const BUILTINS: &[Builtin] = &[
        Builtin {
            name: "field",
            min_args: 1,
            max_args: Some(1),
            pure: false,
            transform: None,
            pre_eval: Some(pre_eval_field),
            eval: eval_field,
        },
        Builtin {
            name: "streq",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_streq,
        },
        Builtin {
            name: "eq",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_eq,
        },
        Builtin {
            name: "ne",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_ne,
        },
        Builtin {
            name: "gt",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_gt,
        },
        Builtin {
            name: "ge",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_ge,
        },
        Builtin {
            name: "lt",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_lt,
        },
        Builtin {
            name: "le",
            min_args: 2,
            max_args: Some(2),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_le,
        },
        Builtin {
            name: "and",
            min_args: 1,
            max_args: None,
            pure: true,
            transform: Some(transform_and),
            pre_eval: None,
            eval: eval_and,
        },
        Builtin {
            name: "or",
            min_args: 1,
            max_args: None,
            pure: true,
            transform: Some(transform_or),
            pre_eval: None,
            eval: eval_or,
        },
        Builtin {
            name: "not",
            min_args: 1,
            max_args: Some(1),
            pure: true,
            transform: None,
            pre_eval: None,
            eval: eval_not,
        },
        Builtin {
            name: "if",
            min_args: 3,
            max_args: Some(3),
            pure: true,
            transform: Some(transform_if),
            pre_eval: None,
            eval: eval_if,
        },
        Builtin {
            name: "ref",
            min_args: 1,
            max_args: Some(1),
            pure: false,
            transform: None,
            pre_eval: None,
            eval: eval_ref,
        },
    ];

    for builtin in BUILTINS {
        registry.register(Arc::new(*builtin))?;
    }
    Ok(())
}

fn pre_eval_field(ctx: &PreEvalContext<'_>) -> Result<Option<Setup>, String> {
    match ctx.arg_literal(0) {
        Some(Value::Str(name)) => Ok(Some(Box::new(name.clone()))),
        _ => Err("field requires a literal string argument".to_string()),
    }
}

fn eval_field(ctx: &EvalContext<'_>) -> EvalOutcome {
    let Some(name) = ctx.setup::<String>() else {
        return EvalOutcome::finished(Value::Null);
    };
    let lookup = ctx.field(name);
    let value = lookup.value.unwrap_or(Value::Null);
    if lookup.finished {
        EvalOutcome::finished(value)
    } else {
        EvalOutcome::partial(value)
    }
}

fn eval_streq(ctx: &EvalContext<'_>) -> EvalOutcome {
    let (a, b) = (ctx.arg(0), ctx.arg(1));
    if !a.finished || !b.finished {
        return EvalOutcome::partial(Value::Null);
    }
    let equal = match (a.value.as_str(), b.value.as_str()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    EvalOutcome::finished(Value::Bool(equal))
}

/// Equality with numeric coercion: 1 equals 1.0.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn eval_eq(ctx: &EvalContext<'_>) -> EvalOutcome {
    let (a, b) = (ctx.arg(0), ctx.arg(1));
    if !a.finished || !b.finished {
        return EvalOutcome::partial(Value::Null);
    }
    EvalOutcome::finished(Value::Bool(value_eq(&a.value, &b.value)))
}

fn eval_ne(ctx: &EvalContext<'_>) -> EvalOutcome {
    let (a, b) = (ctx.arg(0), ctx.arg(1));
    if !a.finished || !b.finished {
        return EvalOutcome::partial(Value::Null);
    }
    EvalOutcome::finished(Value::Bool(!value_eq(&a.value, &b.value)))
}

fn eval_gt(ctx: &EvalContext<'_>) -> EvalOutcome {
    eval_cmp(ctx, Ordering::is_gt)
}

fn eval_ge(ctx: &EvalContext<'_>) -> EvalOutcome {
    eval_cmp(ctx, Ordering::is_ge)
}

fn eval_lt(ctx: &EvalContext<'_>) -> EvalOutcome {
    eval_cmp(ctx, Ordering::is_lt)
}

fn eval_le(ctx: &EvalContext<'_>) -> EvalOutcome {
    eval_cmp(ctx, Ordering::is_le)
}

/// Outside a template body `ref` is rejected by post-transform validation,
/// so this step never runs in a closed scope.
fn eval_ref(_ctx: &EvalContext<'_>) -> EvalOutcome {
    EvalOutcome::finished(Value::Null)
}

/// Numeric comparison; non-numeric operands yield null.
fn eval_cmp(ctx: &EvalContext<'_>, op: fn(Ordering) -> bool) -> EvalOutcome {
    let (a, b) = (ctx.arg(0), ctx.arg(1));
    if !a.finished || !b.finished {
        return EvalOutcome::partial(Value::Null);
    }
    let value = match (a.value.as_number(), b.value.as_number()) {
        (Some(a), Some(b)) => match a.partial_cmp(&b) {
            Some(ordering) => Value::Bool(op(ordering)),
            None => Value::Null,
        },
        _ => Value::Null,
    };
    EvalOutcome::finished(value)
}

fn eval_and(ctx: &EvalContext<'_>) -> EvalOutcome {
    let mut all_finished = true;
    for arg in ctx.args() {
        if arg.finished && !arg.value.truthy() {
            return EvalOutcome::finished(Value::Bool(false));
        }
        all_finished &= arg.finished;
    }
    if all_finished {
        EvalOutcome::finished(Value::Bool(true))
    } else {
        EvalOutcome::partial(Value::Null)
    }
}

fn eval_or(ctx: &EvalContext<'_>) -> EvalOutcome {
    let mut all_finished = true;
    for arg in ctx.args() {
        if arg.finished && arg.value.truthy() {
            return EvalOutcome::finished(Value::Bool(true));
        }
        all_finished &= arg.finished;
    }
    if all_finished {
        EvalOutcome::finished(Value::Bool(false))
    } else {
        EvalOutcome::partial(Value::Null)
    }
}

fn eval_not(ctx: &EvalContext<'_>) -> EvalOutcome {
    let arg = ctx.arg(0);
    if arg.finished {
        EvalOutcome::finished(Value::Bool(!arg.value.truthy()))
    } else {
        EvalOutcome::partial(Value::Null)
    }
}

fn eval_if(ctx: &EvalContext<'_>) -> EvalOutcome {
    let cond = ctx.arg(0);
    if !cond.finished {
        return EvalOutcome::partial(Value::Null);
    }
    let branch = if cond.value.truthy() { 1 } else { 2 };
    ctx.arg(branch).clone()
}

/// Drops literal-truthy conjuncts and short-circuits on a literal-falsy one.
/// The call itself is kept while any non-literal argument remains, so the
/// result type stays boolean.
fn transform_and(ctx: &TransformContext<'_>) -> Result<Option<Rewrite>, String> {
    transform_junction(ctx, "and", true)
}

/// Dual of [`transform_and`]: drops literal-falsy disjuncts and
/// short-circuits on a literal-truthy one.
fn transform_or(ctx: &TransformContext<'_>) -> Result<Option<Rewrite>, String> {
    transform_junction(ctx, "or", false)
}

fn transform_junction(
    ctx: &TransformContext<'_>,
    name: &str,
    neutral: bool,
) -> Result<Option<Rewrite>, String> {
    let mut kept = Vec::new();
    let mut dropped = false;
    for (i, &child) in ctx.children.iter().enumerate() {
        match ctx.child_literal(i) {
            Some(value) if value.truthy() != neutral => {
                return Ok(Some(Rewrite::Literal(Value::Bool(!neutral))));
            }
            Some(_) => dropped = true,
            None => kept.push(Rewrite::Existing(child)),
        }
    }
    if !dropped {
        return Ok(None);
    }
    if kept.is_empty() {
        return Ok(Some(Rewrite::Literal(Value::Bool(neutral))));
    }
    Ok(Some(Rewrite::Call { name: name.to_string(), args: kept }))
}

/// A literal condition selects its branch outright.
fn transform_if(ctx: &TransformContext<'_>) -> Result<Option<Rewrite>, String> {
    match ctx.child_literal(0) {
        Some(cond) => {
            let branch = if cond.truthy() { 1 } else { 2 };
            Ok(Some(Rewrite::Existing(ctx.children[branch])))
        }
        None => Ok(None),
    }
}
