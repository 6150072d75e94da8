//! Runtime values shared by the constant pool, the VM and the AST literals.

mod ops;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use ops::{BinaryOp, OpError, UnaryOp, eval_binary, eval_unary, loosely_equal};

/// A GLYPH runtime value.
///
/// Object equality ignores key order; serialization keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Exact identity used for constant-pool deduplication.
    ///
    /// Stricter than `==`: float bit patterns must match, `Int(1)` differs from
    /// `Float(1.0)`, and object key order matters because it is visible in
    /// emitted JSON.
    pub fn same_constant(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_constant(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_constant(vb))
            }
            _ => false,
        }
    }

    /// Renders the value as JSON text. Non-finite floats become `null`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }

    /// JSON-shaped text for listings: same as [`Value::to_json`] except that
    /// non-finite floats are spelled `inf`, `-inf` and `NaN`, at any depth.
    pub fn to_literal_text(&self) -> String {
        let mut out = String::new();
        self.write_literal(&mut out);
        out
    }

    fn write_literal(&self, out: &mut String) {
        match self {
            Value::Float(f) if !f.is_finite() => out.push_str(&format!("{f:?}")),
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_literal(out);
                }
                out.push(']');
            }
            Value::Object(fields) => {
                out.push('{');
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String(key.clone()).to_json());
                    out.push(':');
                    value.write_literal(out);
                }
                out.push('}');
            }
            other => out.push_str(&other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_equality_ignores_key_order() {
        let a = Value::object([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let b = Value::object([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_eq!(a, b);
        assert!(!a.same_constant(&b));
    }

    #[test]
    fn json_keeps_insertion_order() {
        let v = Value::object([("z", Value::Int(1)), ("a", Value::Bool(true))]);
        assert_eq!(v.to_json(), r#"{"z":1,"a":true}"#);
    }

    #[test]
    fn literal_text_spells_non_finite_floats() {
        let v = Value::Array(vec![
            Value::Float(f64::INFINITY),
            Value::object([("low", Value::Float(f64::NEG_INFINITY)), ("x", Value::Float(2.5))]),
            Value::Float(f64::NAN),
        ]);
        assert_eq!(v.to_literal_text(), r#"[inf,{"low":-inf,"x":2.5},NaN]"#);
        assert_eq!(Value::Float(1.0).to_literal_text(), Value::Float(1.0).to_json());
    }

    #[test]
    fn json_numbers_round_trip_to_int_and_float() {
        let v: Value = serde_json::from_str(r#"[1, 2.5, null, "x"]"#).expect("parse");
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Null,
                Value::String("x".into())
            ])
        );
    }

    #[test]
    fn float_constants_compare_by_bits() {
        assert!(!Value::Float(0.0).same_constant(&Value::Float(-0.0)));
        assert!(Value::Float(f64::NAN).same_constant(&Value::Float(f64::NAN)));
        assert!(!Value::Int(1).same_constant(&Value::Float(1.0)));
    }
}
