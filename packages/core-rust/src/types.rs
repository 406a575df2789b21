use std::fmt;

use serde_json::{json, Value};

/// Structural type of a payload field.
///
/// Mirrors the JSON data model rather than Rust types: a field declared `Int`
/// accepts any integral JSON number, a field declared `Object` accepts any JSON
/// object regardless of its keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Accepts any value, including null.
    Any,
    Bool,
    /// Integral number (a float with zero fraction is normalised to an integer).
    Int,
    /// Any number.
    Float,
    Str,
    /// Homogeneous array.
    List(Box<FieldType>),
    /// Object with string keys and homogeneous values.
    Map(Box<FieldType>),
    /// Any JSON object.
    Object,
    /// The inner type, or null.
    Optional(Box<FieldType>),
}

impl FieldType {
    #[must_use]
    pub fn list(item: FieldType) -> Self {
        Self::List(Box::new(item))
    }

    #[must_use]
    pub fn map(value: FieldType) -> Self {
        Self::Map(Box::new(value))
    }

    #[must_use]
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Whether null is an acceptable value for this type.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Any | Self::Optional(_))
    }

    /// JSON Schema (draft 2020-12) fragment accepting the values of this type.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::Bool => json!({"type": "boolean"}),
            Self::Int => json!({"type": "integer"}),
            Self::Float => json!({"type": "number"}),
            Self::Str => json!({"type": "string"}),
            Self::List(item) => json!({"type": "array", "items": item.json_schema()}),
            Self::Map(value) => json!({"type": "object", "additionalProperties": value.json_schema()}),
            Self::Object => json!({"type": "object"}),
            Self::Optional(inner) => json!({"anyOf": [{"type": "null"}, inner.json_schema()]}),
        }
    }

    /// Type expected at `path` below a value of this type. Each segment is a
    /// list index or map key.
    #[must_use]
    pub fn at_path<'a>(&'a self, path: &[&str]) -> Option<&'a FieldType> {
        let Some((_, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            Self::Optional(inner) => inner.at_path(path),
            Self::List(inner) | Self::Map(inner) => inner.at_path(rest),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("str"),
            Self::List(item) => write!(f, "list[{item}]"),
            Self::Map(value) => write!(f, "map[str, {value}]"),
            Self::Object => f.write_str("object"),
            Self::Optional(inner) => write!(f, "optional[{inner}]"),
        }
    }
}

/// Short name of a JSON value's kind, used in validation messages.
#[must_use]
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
