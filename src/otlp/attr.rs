// SPDX-License-Identifier: Apache-2.0

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Decoded attributes keyed by attribute name. Repeated keys keep the last value seen.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A decoded OTLP `AnyValue`.
///
/// Only the four scalar forms are decoded; any other shape (arrays, kvlists, bytes or an
/// empty value object) is kept as the JSON text of the value object in `Opaque`.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Opaque(String),
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Double(d) => write!(f, "{}", d),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Opaque(s) => write!(f, "{}", s),
        }
    }
}

// Strings and opaque values are both plain JSON strings on the way out. A NaN double
// (from an unparseable intValue) is written as null by serde_json.
impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::String(s) | AttributeValue::Opaque(s) => serializer.serialize_str(s),
            AttributeValue::Int(i) => serializer.serialize_i64(*i),
            AttributeValue::Double(d) => serializer.serialize_f64(*d),
            AttributeValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl AttributeValue {
    /// Decode one OTLP/JSON value object. The first present field wins, checked in the
    /// order stringValue, intValue, doubleValue, boolValue.
    pub fn decode(value: &Map<String, Value>) -> Self {
        if let Some(v) = present(value, "stringValue") {
            return passthrough(v);
        }
        if let Some(v) = present(value, "intValue") {
            return parse_int(v);
        }
        if let Some(v) = present(value, "doubleValue") {
            return match v {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(AttributeValue::Double)
                    .unwrap_or_else(|_| AttributeValue::String(s.clone())),
                v => passthrough(v),
            };
        }
        if let Some(v) = present(value, "boolValue") {
            return passthrough(v);
        }

        AttributeValue::Opaque(Value::Object(value.clone()).to_string())
    }
}

/// Decode an OTLP attribute list (`[{key, value}, ...]`). Entries without a non-empty key or
/// without a value object are skipped, as is anything that is not an array.
pub fn decode_attributes(list: Option<&Value>) -> Attributes {
    let mut attrs = Attributes::new();
    let Some(entries) = list.and_then(Value::as_array) else {
        return attrs;
    };

    for entry in entries {
        let key = match entry.get("key").and_then(Value::as_str) {
            Some(k) if !k.is_empty() => k,
            _ => continue,
        };
        let Some(value) = entry.get("value").and_then(Value::as_object) else {
            continue;
        };
        attrs.insert(key.to_string(), AttributeValue::decode(value));
    }

    attrs
}

fn present<'a>(value: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    value.get(field).filter(|v| !v.is_null())
}

fn passthrough(v: &Value) -> AttributeValue {
    match v {
        Value::String(s) => AttributeValue::String(s.clone()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        v => AttributeValue::Opaque(v.to_string()),
    }
}

// OTLP/JSON carries 64-bit integers as decimal strings. Parsing takes the leading integer
// and ignores trailing garbage; no digits at all gives NaN rather than an error.
fn parse_int(v: &Value) -> AttributeValue {
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Double(n.as_f64().map(f64::trunc).unwrap_or(f64::NAN)),
        },
        Value::String(s) => parse_leading_int(s),
        _ => AttributeValue::Double(f64::NAN),
    }
}

fn parse_leading_int(s: &str) -> AttributeValue {
    let s = s.trim_start();
    let digits_from = if s.starts_with('-') || s.starts_with('+') {
        1
    } else {
        0
    };
    let digits_len = s[digits_from..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits_len == 0 {
        return AttributeValue::Double(f64::NAN);
    }

    let number = &s[..digits_from + digits_len];
    match number.parse::<i64>() {
        Ok(i) => AttributeValue::Int(i),
        // Out of i64 range, keep the magnitude as a double
        Err(_) => AttributeValue::Double(number.parse::<f64>().unwrap_or(f64::NAN)),
    }
}
