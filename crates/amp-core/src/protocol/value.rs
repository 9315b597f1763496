//! Typed value codec.
//!
//! Converts between the wire [`TypedValue`] and the native [`Value`] tree.
//! Both directions recurse into arrays and structs, so arbitrarily nested
//! parameter values survive a round trip unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::protocol::codec::now_ns;
use crate::protocol::messages::{typed_value::Kind, StructEntry, TypedArray, TypedStruct, TypedValue};

const SECONDS_PER_DAY: i64 = 86_400;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A native parameter value.
///
/// Struct keys are kept in a [`BTreeMap`], so encoding a struct always emits
/// its entries in sorted key order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    /// Seconds since the Unix epoch.
    Date(i64),
    /// Nanoseconds since the Unix epoch.
    Time(i64),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Decimal(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Struct(entries)
    }
}

// ── Type names ────────────────────────────────────────────────────────────────

/// The type names a SUT may use when declaring label parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    Array,
    Struct,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown parameter type '{0}'")]
pub struct UnknownValueType(pub String);

impl FromStr for ValueType {
    type Err = UnknownValueType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "array" => Ok(Self::Array),
            "struct" => Ok(Self::Struct),
            other => Err(UnknownValueType(other.to_string())),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Array => "array",
            Self::Struct => "struct",
        };
        f.write_str(name)
    }
}

impl ValueType {
    /// A representative value of this type, used when declaring labels.
    ///
    /// Dates are today's midnight (UTC), times are the current instant.
    pub fn placeholder(self) -> Value {
        match self {
            Self::String => Value::String("string".to_string()),
            Self::Integer => Value::Integer(1),
            Self::Decimal => Value::Decimal(1.0),
            Self::Boolean => Value::Boolean(true),
            Self::Date => {
                let secs = now_ns() / NANOS_PER_SECOND;
                Value::Date(secs - secs.rem_euclid(SECONDS_PER_DAY))
            }
            Self::Time => Value::Time(now_ns()),
            Self::Array => Value::Array(Vec::new()),
            Self::Struct => Value::Struct(BTreeMap::new()),
        }
    }

    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Integer(_) => Self::Integer,
            Value::Decimal(_) => Self::Decimal,
            Value::Boolean(_) => Self::Boolean,
            Value::Date(_) => Self::Date,
            Value::Time(_) => Self::Time,
            Value::Array(_) => Self::Array,
            Value::Struct(_) => Self::Struct,
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Encodes a native value into its wire form.
pub fn encode(value: &Value) -> TypedValue {
    let kind = match value {
        Value::String(s) => Kind::String(s.clone()),
        Value::Integer(n) => Kind::Integer(*n),
        Value::Decimal(x) => Kind::Decimal(*x),
        Value::Boolean(b) => Kind::Boolean(*b),
        Value::Date(secs) => Kind::Date(*secs),
        Value::Time(nanos) => Kind::Time(*nanos),
        Value::Array(values) => Kind::Array(TypedArray {
            values: values.iter().map(encode).collect(),
        }),
        Value::Struct(entries) => Kind::Struct(TypedStruct {
            entries: entries
                .iter()
                .map(|(key, v)| StructEntry {
                    key: key.clone(),
                    value: Some(encode(v)),
                })
                .collect(),
        }),
    };
    TypedValue { kind: Some(kind) }
}

/// Decodes a wire value.
///
/// Returns `None`, after logging a warning, if no variant is populated.
/// Array elements and struct entries without a value are dropped the same
/// way; when a struct repeats a key, the last entry wins.
pub fn decode(typed: &TypedValue) -> Option<Value> {
    let Some(kind) = typed.kind.as_ref() else {
        warn!("unknown type of value: no variant populated");
        return None;
    };
    let value = match kind {
        Kind::String(s) => Value::String(s.clone()),
        Kind::Integer(n) => Value::Integer(*n),
        Kind::Decimal(x) => Value::Decimal(*x),
        Kind::Boolean(b) => Value::Boolean(*b),
        Kind::Date(secs) => Value::Date(*secs),
        Kind::Time(nanos) => Value::Time(*nanos),
        Kind::Array(array) => Value::Array(array.values.iter().filter_map(decode).collect()),
        Kind::Struct(structure) => {
            let mut entries = BTreeMap::new();
            for entry in &structure.entries {
                match entry.value.as_ref().and_then(decode) {
                    Some(v) => {
                        entries.insert(entry.key.clone(), v);
                    }
                    None => warn!("struct entry '{}' has no value, omitting", entry.key),
                }
            }
            Value::Struct(entries)
        }
    };
    Some(value)
}

/// Encodes a JSON value, mapping objects to structs and numbers to integers
/// when they fit in an `i64` and to decimals otherwise.
///
/// JSON `null` has no wire counterpart; it is logged and produces an unset
/// [`TypedValue`].
pub fn encode_json(json: &serde_json::Value) -> TypedValue {
    use serde_json::Value as Json;

    let kind = match json {
        Json::Null => {
            warn!("unsupported type: null cannot be encoded as a typed value");
            return TypedValue::default();
        }
        Json::Bool(b) => Kind::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Kind::Integer(i),
            None => Kind::Decimal(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Kind::String(s.clone()),
        Json::Array(values) => Kind::Array(TypedArray {
            values: values.iter().map(encode_json).collect(),
        }),
        Json::Object(map) => Kind::Struct(TypedStruct {
            entries: map
                .iter()
                .map(|(key, v)| StructEntry {
                    key: key.clone(),
                    value: Some(encode_json(v)),
                })
                .collect(),
        }),
    };
    TypedValue { kind: Some(kind) }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
