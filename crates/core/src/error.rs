//! Error types for restable
//!
//! This module defines every error the engine can surface. Each variant is
//! one kind of the taxonomy: configuration, decode, validation, integrity,
//! not-ready and not-found. We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.

use crate::types::{IndexKey, ResourceType};
use crate::value::Value;
use std::io;
use thiserror::Error;

/// Result type alias for restable operations
pub type Result<T> = std::result::Result<T, Error>;

/// Integrity violations detected while indexing a reload pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    /// The identity accessor produced null
    #[error("identity value is null")]
    NullIdentity,

    /// Two records in one pass share an identity
    #[error("duplicate identity {id}")]
    DuplicateIdentity {
        /// The repeated identity
        id: Value,
    },

    /// Two records in one pass share a unique index key
    #[error("duplicate value '{key}' for unique index '{index}'")]
    DuplicateUniqueKey {
        /// Index name
        index: String,
        /// The repeated key
        key: IndexKey,
    },
}

/// Error types for the resource engine
#[derive(Debug, Error)]
pub enum Error {
    /// Bad metadata, registration or wiring; raised before any data is loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backing resource unreadable, wrong format or structurally malformed
    #[error("Decode error for {resource} at {location}: {reason}")]
    Decode {
        /// Resource type being decoded (empty when unknown)
        resource: String,
        /// Backing location or row position
        location: String,
        /// What went wrong
        reason: String,
    },

    /// A record failed external validation
    #[error("Validation failed for {resource} id={id}: {}", .violations.join("; "))]
    Validation {
        /// Resource type
        resource: ResourceType,
        /// Identity of the offending record (null if it has none)
        id: Value,
        /// Human-readable violations
        violations: Vec<String>,
    },

    /// Identity or unique-index invariant broken during a reload
    #[error("Integrity error in {resource}: {violation}")]
    Integrity {
        /// Resource type
        resource: ResourceType,
        /// The broken invariant
        violation: IntegrityViolation,
    },

    /// Read invoked before the first successful initialize
    #[error("Resource {resource} is not initialized yet")]
    NotReady {
        /// Resource type (empty when the storage is not bound)
        resource: String,
    },

    /// `get_required` on an absent identity
    #[error("Identified resource does not exist: {resource} id={id}")]
    NotFound {
        /// Resource type
        resource: ResourceType,
        /// The identity that was looked up
        id: Value,
    },
}

impl Error {
    /// Build a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Build a decode error
    pub fn decode(
        resource: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Decode {
            resource: resource.into(),
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Build an integrity error
    pub fn integrity(resource: &ResourceType, violation: IntegrityViolation) -> Self {
        Error::Integrity {
            resource: resource.clone(),
            violation,
        }
    }

    /// Configuration error?
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Decode error?
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// Validation error?
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Integrity error?
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity { .. })
    }

    /// Not-ready error?
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::NotReady { .. })
    }

    /// Not-found error?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// The integrity violation, if this is an integrity error
    pub fn integrity_violation(&self) -> Option<&IntegrityViolation> {
        match self {
            Error::Integrity { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::decode("", "", e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::decode("", format!("line {} column {}", e.line(), e.column()), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let err = Error::configuration("duplicate index 'name'");
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("duplicate index 'name'"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation {
            resource: ResourceType::new("Item"),
            id: Value::Int(7),
            violations: vec!["name must not be null".into(), "price too low".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Item"));
        assert!(msg.contains("id=7"));
        assert!(msg.contains("name must not be null; price too low"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display_integrity() {
        let err = Error::integrity(
            &ResourceType::new("Item"),
            IntegrityViolation::DuplicateUniqueKey {
                index: "name".into(),
                key: IndexKey::from_values(&[Value::from("A")]),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("unique index 'name'"));
        assert!(msg.contains("'A'"));
        assert!(err.is_integrity());
        assert!(matches!(
            err.integrity_violation(),
            Some(IntegrityViolation::DuplicateUniqueKey { .. })
        ));
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound {
            resource: ResourceType::new("Item"),
            id: Value::Int(9),
        };
        assert!(err.to_string().contains("does not exist"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing file");
        let err: Error = io_err.into();
        assert!(err.is_decode());
        assert!(err.to_string().contains("missing file"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("[1,").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.is_decode());
    }
}
