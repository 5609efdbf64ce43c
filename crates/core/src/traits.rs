//! External capabilities consumed by the storage engine
//!
//! - Validator: record-level validation, returns human-readable violations
//! - InjectResolver: resolves symbolic references to values for attribute injection
//!
//! Both are `Send + Sync` so one instance can be shared by every storage.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{coerce_for_injection, AttributeKind, Record};
use crate::value::Value;

/// Record-level validation
///
/// An empty result means the record is valid.
pub trait Validator: Send + Sync {
    /// Validate one record
    fn validate(&self, record: &Record) -> Vec<String>;
}

impl<F> Validator for F
where
    F: Fn(&Record) -> Vec<String> + Send + Sync,
{
    fn validate(&self, record: &Record) -> Vec<String> {
        self(record)
    }
}

/// Accepts every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _record: &Record) -> Vec<String> {
        Vec::new()
    }
}

/// Requires a fixed set of attributes to be non-null
#[derive(Debug, Default, Clone)]
pub struct RequiredAttributes {
    attributes: Vec<String>,
}

impl RequiredAttributes {
    /// Require every attribute in `attributes`
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequiredAttributes {
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for RequiredAttributes {
    fn validate(&self, record: &Record) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|name| record.get(name).is_null())
            .map(|name| format!("{} must not be null", name))
            .collect()
    }
}

/// Resolves injection references
///
/// `kind` is the declared type of the attribute receiving the value; the
/// resolver is expected to return a value of that kind.
pub trait InjectResolver: Send + Sync {
    /// Resolve `reference` for an attribute of type `kind`
    fn resolve(&self, reference: &str, kind: AttributeKind) -> Result<Value>;
}

/// Resolver backed by a fixed reference table
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    values: HashMap<String, Value>,
}

impl MapResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(mut self, reference: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(reference, value);
        self
    }

    /// Register a value under a reference
    pub fn insert(&mut self, reference: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(reference.into(), value.into());
    }
}

impl InjectResolver for MapResolver {
    fn resolve(&self, reference: &str, kind: AttributeKind) -> Result<Value> {
        let value = self.values.get(reference).cloned().ok_or_else(|| {
            Error::configuration(format!("no injectable value registered for '{}'", reference))
        })?;
        coerce_for_injection(kind, reference, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceType;

    fn record() -> Record {
        Record::new(ResourceType::new("Item")).with("id", 1)
    }

    #[test]
    fn test_noop_validator_accepts_everything() {
        assert!(NoopValidator.validate(&record()).is_empty());
    }

    #[test]
    fn test_closure_validator() {
        let validator = |r: &Record| {
            if r.get("id").as_int() == Some(1) {
                vec!["id 1 is reserved".to_string()]
            } else {
                vec![]
            }
        };
        assert_eq!(validator.validate(&record()), vec!["id 1 is reserved"]);
    }

    #[test]
    fn test_required_attributes() {
        let validator = RequiredAttributes::new(["id", "name"]);
        assert_eq!(validator.validate(&record()), vec!["name must not be null"]);
        assert!(validator.validate(&record().with("name", "x")).is_empty());
    }

    #[test]
    fn test_map_resolver_converts_to_kind() {
        let resolver = MapResolver::new().with("rate", "1.5");
        assert_eq!(
            resolver.resolve("rate", AttributeKind::Float).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_map_resolver_missing_reference() {
        let err = MapResolver::new()
            .resolve("missing", AttributeKind::String)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
