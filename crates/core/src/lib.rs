//! Core types and traits for restable
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for record attributes
//! - ResourceType: Identifier of a resource schema
//! - Record: One decoded resource instance
//! - IndexKey: Delimiter-joined secondary index key
//! - AttributeKind: Declared attribute types and conversions
//! - Error: Error type hierarchy
//! - Traits: External capabilities (Validator, InjectResolver)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, IntegrityViolation, Result};
pub use traits::{InjectResolver, MapResolver, NoopValidator, RequiredAttributes, Validator};
pub use types::{AttributeKind, IndexKey, Record, ResourceType, INDEX_KEY_DELIMITER};
pub use value::Value;
