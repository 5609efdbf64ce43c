//! Resource metadata and index accessors
//!
//! Declares what a resource type looks like ([`ResourceSchema`]) and turns
//! those declarations into the accessors a storage indexes by:
//! - Accessor: reads one stored or computed value from a record
//! - AccessorSet: identity accessor plus named index accessors
//! - SortComparator: ordering of records sharing one index key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod builder;
pub mod comparator;
pub mod schema;

pub use accessor::Accessor;
pub use builder::{AccessorSet, IndexAccessor, IndexSource};
pub use comparator::{SortComparator, SortDirection};
pub use schema::{
    AttributeDef, GetterDef, GetterFn, IndexMarker, ResourceSchema, ResourceSchemaBuilder,
};
