//! Parser for Vigil rule expressions using the Pest parser generator.
//!
//! The parser transforms a single s-expression into a typed [`SexprAst`]
//! without resolving call names; the engine's call registry does that.
//! The entire input must be consumed: trailing bytes after a complete
//! expression are a parse error, never a successful prefix result.
//!
//! The grammar is defined in `grammar.pest` at the crate root.

use pest::Parser;
use pest_derive::Parser;

use crate::ast::{LiteralAst, SexprAst};
use crate::errors::FrontendError;

#[derive(Parser)]
#[grammar = "../grammar.pest"]
struct SexprParser;

/// Parses one complete s-expression.
///
/// `origin` is a provenance string (e.g. `file:line`) included verbatim in
/// parse error messages.
///
/// # Errors
///
/// Returns [`FrontendError::Parse`] when the input is not exactly one
/// well-formed expression. The message contains a bounded context window
/// around the failure point plus the origin string.
pub fn parse_expr(source: &str, origin: &str) -> Result<SexprAst, FrontendError> {
    let mut pairs = SexprParser::parse(Rule::input, source)
        .map_err(|e| FrontendError::parse_at(source, error_offset(&e), origin))?;

    let input = pairs
        .next()
        .ok_or_else(|| FrontendError::Malformed("empty parse result".to_string()))?;
    let expr = input
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| FrontendError::Malformed("missing expression".to_string()))?;

    build_expr(expr)
}

fn error_offset(err: &pest::error::Error<Rule>) -> usize {
    match err.location {
        pest::error::InputLocation::Pos(pos) => pos,
        pest::error::InputLocation::Span((start, _)) => start,
    }
}

fn build_expr(pair: pest::iterators::Pair<'_, Rule>) -> Result<SexprAst, FrontendError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| FrontendError::Malformed("empty expression".to_string()))?;
    match inner.as_rule() {
        Rule::call => build_call(inner),
        Rule::literal => Ok(SexprAst::Literal(build_literal(inner)?)),
        other => Err(FrontendError::Malformed(format!(
            "unexpected rule {:?} in expression",
            other
        ))),
    }
}

fn build_call(pair: pest::iterators::Pair<'_, Rule>) -> Result<SexprAst, FrontendError> {
    let mut name = String::new();
    let mut args = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::ident => name = p.as_str().to_string(),
            Rule::expr => args.push(build_expr(p)?),
            _ => {}
        }
    }
    if name.is_empty() {
        return Err(FrontendError::Malformed("call without a name".to_string()));
    }
    Ok(SexprAst::Call { name, args })
}

fn build_literal(pair: pest::iterators::Pair<'_, Rule>) -> Result<LiteralAst, FrontendError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| FrontendError::Malformed("empty literal".to_string()))?;
    match inner.as_rule() {
        Rule::null_lit => Ok(LiteralAst::Null),
        Rule::bool_lit => Ok(LiteralAst::Bool(inner.as_str() == "true")),
        Rule::int_lit => inner
            .as_str()
            .parse::<i64>()
            .map(LiteralAst::Int)
            .map_err(|_| {
                FrontendError::Malformed(format!("integer literal out of range: {}", inner.as_str()))
            }),
        Rule::float_lit => inner
            .as_str()
            .parse::<f64>()
            .map(LiteralAst::Float)
            .map_err(|_| {
                FrontendError::Malformed(format!("malformed float literal: {}", inner.as_str()))
            }),
        Rule::string_lit => Ok(LiteralAst::Str(unescape(inner.as_str()))),
        Rule::list_lit => {
            let mut items = Vec::new();
            for p in inner.into_inner() {
                if p.as_rule() == Rule::literal {
                    items.push(build_literal(p)?);
                }
            }
            Ok(LiteralAst::List(items))
        }
        other => Err(FrontendError::Malformed(format!(
            "unexpected rule {:?} in literal",
            other
        ))),
    }
}

/// Strip surrounding quotes and resolve `\x` escapes to `x`.
fn unescape(quoted: &str) -> String {
    let body = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
