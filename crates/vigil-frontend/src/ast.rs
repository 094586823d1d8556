//! Typed, unlinked expression trees.
//!
//! The parser produces a [`SexprAst`] per expression. The tree carries no
//! graph linkage and no resolved call behavior; the engine interns it into
//! its shared expression graph and resolves call names against its registry.

use std::fmt;

/// A parsed s-expression: a call tree over literals.
#[derive(Debug, Clone, PartialEq)]
pub enum SexprAst {
    /// A function call `(name arg ...)`.
    Call { name: String, args: Vec<SexprAst> },
    /// A literal value.
    Literal(LiteralAst),
}

/// A literal value as written in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralAst {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<LiteralAst>),
}

/// Quote a string for s-expression output, escaping `'` and `\`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

impl fmt::Display for LiteralAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::Str(s) => write!(f, "{}", quote(s)),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for SexprAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { name, args } => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Self::Literal(lit) => write!(f, "{}", lit),
        }
    }
}
