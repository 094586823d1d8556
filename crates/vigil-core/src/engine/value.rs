//! Runtime values produced by expression evaluation.

use std::fmt;

use vigil_frontend::ast::{LiteralAst, quote};

/// A value flowing through the expression graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// `Null` and `false` are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value, if it has one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&LiteralAst> for Value {
    fn from(lit: &LiteralAst) -> Self {
        match lit {
            LiteralAst::Null => Self::Null,
            LiteralAst::Bool(v) => Self::Bool(*v),
            LiteralAst::Int(v) => Self::Int(*v),
            LiteralAst::Float(v) => Self::Float(*v),
            LiteralAst::Str(s) => Self::Str(s.clone()),
            LiteralAst::List(items) => Self::List(items.iter().map(Value::from).collect()),
        }
    }
}

impl fmt::Display for Value {
    /// Canonical s-expression rendering, matching the frontend literal syntax.
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

/// Hashable stand-in for [`Value`] used as part of the graph's structural
/// dedup key. Floats are keyed by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    List(Vec<ValueKey>),
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Bool(*v),
            Value::Int(v) => Self::Int(*v),
            Value::Float(v) => Self::Float(v.to_bits()),
            Value::Str(s) => Self::Str(s.clone()),
            Value::List(items) => Self::List(items.iter().map(ValueKey::from).collect()),
        }
    }
}
