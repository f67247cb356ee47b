//! Runtime values produced by evaluation.
//!
//! Integers are immediate, booleans are exactly two unit variants, and the
//! heap kinds share their payload through `Arc` so moving a value in and out
//! of the node store never copies it.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    True,
    False,
    /// Host-provided text, e.g. a sensor label pushed through an input node
    Text(Arc<str>),
    Tuple(Arc<[Value]>),
}

/// Kind tag of a [`Value`], used for operator dispatch and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Boolean,
    Text,
    Tuple,
}

impl Value {
    pub const TRUE: Value = Value::True;
    pub const FALSE: Value = Value::False;

    pub fn int(value: i32) -> Self {
        Value::Int(value)
    }

    /// Maps a Rust `bool` onto one of the two boolean singletons.
    pub fn bool(value: bool) -> Self {
        if value { Value::True } else { Value::False }
    }

    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Value::Text(text.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Integer,
            Value::True | Value::False => ValueKind::Boolean,
            Value::Text(_) => ValueKind::Text,
            Value::Tuple(_) => ValueKind::Tuple,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Only the `false` singleton is false; every other value coerces to true.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::False)
    }

    /// Branch selection test: only the `true` singleton takes the `then` branch.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::True)
    }

    /// Per-kind equality: values of different kinds are never equal, booleans
    /// compare by singleton, text by content and tuples element-wise.
    pub fn structurally_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::True, Value::True) | (Value::False, Value::False) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.structurally_equal(b))
            }
            _ => false,
        }
    }

    #[cfg(feature = "cli")]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(value) => serde_json::json!(value),
            Value::True => serde_json::Value::Bool(true),
            Value::False => serde_json::Value::Bool(false),
            Value::Text(text) => serde_json::Value::String(text.to_string()),
            Value::Tuple(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::True => f.write_str("true"),
            Value::False => f.write_str("false"),
            Value::Text(text) => write!(f, "{text:?}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
            ValueKind::Text => "text",
            ValueKind::Tuple => "tuple",
        })
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}
