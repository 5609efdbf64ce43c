//! Core types for restable
//!
//! This module defines:
//! - ResourceType: schema identifier for one loadable resource (a "table")
//! - AttributeKind: declared type of an attribute, drives conversions
//! - IndexKey: delimiter-joined key used by every secondary index
//! - Record: one decoded instance of a resource type

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Separator between the fragments of a composite index key
pub const INDEX_KEY_DELIMITER: char = '^';

/// Identifier of a resource type
///
/// Cheap to clone; used as the registry key and carried by every record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType(Arc<str>);

impl ResourceType {
    /// Create a resource type from its name
    pub fn new(name: impl AsRef<str>) -> Self {
        ResourceType(Arc::from(name.as_ref()))
    }

    /// The type name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(name: &str) -> Self {
        ResourceType::new(name)
    }
}

/// Declared type of an attribute
///
/// Readers use it to turn raw cell text or JSON into typed values;
/// injection resolvers use it to convert context values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// true/false
    Bool,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Text
    String,
    /// Any JSON value, kept as-is
    Json,
}

impl AttributeKind {
    /// Parse raw cell text into a value of this kind
    ///
    /// Surrounding whitespace is ignored except for `String`.
    pub fn parse(&self, raw: &str) -> std::result::Result<Value, String> {
        let trimmed = raw.trim();
        match self {
            AttributeKind::String => Ok(Value::String(raw.to_string())),
            AttributeKind::Int => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| {
                    // spreadsheet exports write integral numbers as "3.0"
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .and_then(integral)
                        .map(Value::Int)
                        .ok_or(())
                })
                .map_err(|_| format!("'{}' is not an integer", raw)),
            AttributeKind::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{}' is not a number", raw)),
            AttributeKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", raw)),
            },
            AttributeKind::Json => serde_json::from_str::<serde_json::Value>(trimmed)
                .map(Value::from)
                .map_err(|e| format!("'{}' is not valid JSON: {}", raw, e)),
        }
    }

    /// Convert an already-typed value into this kind
    ///
    /// Null passes through unchanged. Strings are parsed; numbers widen or
    /// narrow when lossless.
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (AttributeKind::Json, v) => Ok(v),
            (AttributeKind::String, Value::String(s)) => Ok(Value::String(s)),
            (AttributeKind::String, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (AttributeKind::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (AttributeKind::Int, Value::Float(f)) => integral(f)
                .map(Value::Int)
                .ok_or_else(|| format!("'{}' is not an integer", f)),
            (AttributeKind::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (AttributeKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (AttributeKind::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (kind, Value::String(s)) => kind.parse(&s),
            (kind, v) => Err(format!("cannot convert {} to {:?}", v.type_name(), kind)),
        }
    }
}

/// Exact `i64` value of an integral float inside the `i64` range
fn integral(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Key of a secondary index entry
///
/// Built by joining the display form of one or more values with
/// [`INDEX_KEY_DELIMITER`]. Construction is order-sensitive and identical
/// for storing and for lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey(String);

impl IndexKey {
    /// Join values into an index key
    pub fn from_values(values: &[Value]) -> Self {
        let mut key = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                key.push(INDEX_KEY_DELIMITER);
            }
            key.push_str(&value.to_string());
        }
        IndexKey(key)
    }

    /// The joined key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded instance of a resource type
///
/// Attributes that were never set read as `Value::Null`. A record is only
/// mutated before it is indexed (by readers and instance injection); storages
/// hand out shared, immutable `Arc<Record>`s.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    resource: ResourceType,
    attributes: BTreeMap<String, Value>,
}

static NULL: Value = Value::Null;

impl Record {
    /// Create an empty record of the given type
    pub fn new(resource: ResourceType) -> Self {
        Record {
            resource,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute assignment
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// The record's resource type
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource
    }

    /// Read an attribute; unset attributes read as null
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// Assign an attribute; assigning null unsets it
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.attributes.remove(&name);
            }
            v => {
                self.attributes.insert(name, v);
            }
        }
    }

    /// Iterate over set attributes in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the record as a JSON object (used in diagnostics)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(Value::Object(self.attributes.clone()))
    }
}

/// Convert a value for an attribute, mapping failures to a configuration error
///
/// Used by injection, where a bad value is a wiring problem rather than a
/// malformed file.
pub fn coerce_for_injection(kind: AttributeKind, attribute: &str, value: Value) -> Result<Value> {
    kind.coerce(value).map_err(|reason| {
        Error::configuration(format!("cannot inject attribute '{}': {}", attribute, reason))
    })
}
