//! Comparison values and key normalization
//!
//! Index structures are keyed by `i64`. Every comparison value carried by a
//! predicate is mapped onto that key space with [`normalize`]:
//! - numbers are truncated to their integer part
//! - `true` maps to `1`, `false` to `-1`
//! - everything else maps to a content hash
//!
//! Hashed keys only support equality lookups. Their order has nothing to do
//! with the natural order of the original values, so range lookups over them
//! return arbitrary slices of the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A comparison value carried by an indexed predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// String value
    String(String),
    /// Binary data
    Binary(Vec<u8>),
    /// DateTime with UTC timezone
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Check if value is a number (int or float)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Float64(_))
    }

    /// Whether the normalized key keeps the natural order of this value.
    ///
    /// Only numbers and booleans qualify; every other type falls back to a
    /// hash key.
    pub fn is_order_preserving(&self) -> bool {
        self.is_number() || matches!(self, Value::Bool(_))
    }

    /// Short type name used in log output
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::DateTime(_) => "datetime",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// Map a comparison value to the `i64` key space used by indexes.
pub fn normalize(value: &Value) -> i64 {
    match value {
        Value::Int32(i) => *i as i64,
        Value::Int64(i) => *i,
        // Truncates toward zero, saturates at the i64 bounds, NaN becomes 0.
        Value::Float64(x) => *x as i64,
        Value::Bool(true) => 1,
        Value::Bool(false) => -1,
        Value::Null => 0,
        other => content_hash(other),
    }
}

/// Alias of [`normalize`] under the name used by index maintenance callers.
pub fn get_long_value(value: &Value) -> i64 {
    normalize(value)
}

fn content_hash(value: &Value) -> i64 {
    // DefaultHasher::new() uses fixed keys, so keys are stable for the
    // lifetime of the process and across service instances.
    let mut hasher = DefaultHasher::new();
    match value {
        Value::String(s) => {
            0u8.hash(&mut hasher);
            s.hash(&mut hasher);
        }
        Value::Binary(b) => {
            1u8.hash(&mut hasher);
            b.hash(&mut hasher);
        }
        Value::DateTime(dt) => {
            2u8.hash(&mut hasher);
            dt.hash(&mut hasher);
        }
        _ => {}
    }
    hasher.finish() as i64
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}
