//! restable - indexed, hot-reloadable in-memory resource tables
//!
//! Loads resource files (JSON arrays or stacked tabular sheets) into typed,
//! indexed in-memory collections that application code queries by identity
//! or by named secondary indexes. Backing files can be reloaded at any time;
//! a reload publishes a complete new generation or nothing at all.
//!
//! # Quick Start
//!
//! ```ignore
//! use restable::{
//!     AttributeDef, AttributeKind, IndexMarker, ResourceDefinition, ResourceSchema,
//!     ResourceType, StorageContext, StorageManager,
//! };
//!
//! let schema = ResourceSchema::builder("Item")
//!     .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
//!     .attribute(
//!         AttributeDef::new("model", AttributeKind::String)
//!             .index(IndexMarker::new("name").unique()),
//!     )
//!     .build();
//!
//! let manager = StorageManager::new(StorageContext::default());
//! let items = manager.initialize(ResourceDefinition::new(schema, "data/Item.json", "json"))?;
//!
//! let item = items.get(2)?;
//! let by_name = items.get_unique("name", &["B".into()])?;
//! ```
//!
//! # Architecture
//!
//! - `restable-core`: values, records, errors, validator and resolver traits
//! - `restable-index`: declarative metadata and index accessors
//! - `restable-readers`: format readers
//! - `restable-storage`: storages, registry, monitor and configuration

pub use restable_core::*;
pub use restable_index::*;
pub use restable_readers::*;
pub use restable_storage::*;
