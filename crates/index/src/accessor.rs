//! Attribute accessors
//!
//! An `Accessor` reads one logical value out of a record: either a stored
//! attribute or a computed getter. Every identity, index and ordering
//! decision goes through this one type.

use std::fmt;
use std::sync::Arc;

use restable_core::{Record, Value};

use crate::schema::GetterFn;

/// Reads one value from a record
#[derive(Clone)]
pub enum Accessor {
    /// Stored attribute, read by name
    Attribute(String),
    /// Computed value
    Computed {
        /// Getter name (diagnostics only)
        name: String,
        /// The function
        getter: GetterFn,
    },
}

impl Accessor {
    /// Accessor for a stored attribute
    pub fn attribute(name: impl Into<String>) -> Self {
        Accessor::Attribute(name.into())
    }

    /// Accessor for a computed value
    pub fn computed(name: impl Into<String>, getter: GetterFn) -> Self {
        Accessor::Computed {
            name: name.into(),
            getter,
        }
    }

    /// Read the value; unset attributes read as null
    pub fn read(&self, record: &Record) -> Value {
        match self {
            Accessor::Attribute(name) => record.get(name).clone(),
            Accessor::Computed { getter, .. } => getter(record),
        }
    }

    /// Name of the attribute or getter
    pub fn name(&self) -> &str {
        match self {
            Accessor::Attribute(name) => name,
            Accessor::Computed { name, .. } => name,
        }
    }

    /// Is this a computed accessor?
    pub fn is_computed(&self) -> bool {
        matches!(self, Accessor::Computed { .. })
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            Accessor::Computed { name, .. } => f.debug_tuple("Computed").field(name).finish(),
        }
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Accessor::Attribute(a), Accessor::Attribute(b)) => a == b,
            (
                Accessor::Computed { name: a, getter: ga },
                Accessor::Computed { name: b, getter: gb },
            ) => a == b && Arc::ptr_eq(ga, gb),
            _ => false,
        }
    }
}
