//! Declarative resource metadata
//!
//! A `ResourceSchema` is the metadata table for one resource type: its
//! attributes (with declared kinds), its computed getters, and the identity
//! and index markers attached to either. Nothing here is validated; the
//! accessor builder checks the markers when a storage binds the schema.
//!
//! ```ignore
//! let schema = ResourceSchema::builder("Item")
//!     .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
//!     .attribute(
//!         AttributeDef::new("model", AttributeKind::String)
//!             .index(IndexMarker::new("name").unique()),
//!     )
//!     .attribute(
//!         AttributeDef::new("category", AttributeKind::String)
//!             .index(IndexMarker::new("cat-idx").order_by(["priority desc"])),
//!     )
//!     .attribute(AttributeDef::new("priority", AttributeKind::Int))
//!     .build();
//! ```

use std::fmt;
use std::sync::Arc;

use restable_core::{AttributeKind, Record, ResourceType, Value};

use crate::accessor::Accessor;

/// Computed attribute function
pub type GetterFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Index declaration attached to an attribute or getter
///
/// Several attributes carrying markers with the same name form one composite
/// index, joined in ascending `order` rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMarker {
    name: String,
    order: i32,
    unique: bool,
    order_by: Vec<String>,
}

impl IndexMarker {
    /// Declare membership in index `name`
    pub fn new(name: impl Into<String>) -> Self {
        IndexMarker {
            name: name.into(),
            order: 0,
            unique: false,
            order_by: Vec::new(),
        }
    }

    /// Position within a composite index (smaller comes first)
    pub fn order(mut self, rank: i32) -> Self {
        self.order = rank;
        self
    }

    /// Mark the index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Ordering of records sharing one key, as `"<attribute> <asc|desc>"` entries
    pub fn order_by<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rank within a composite index
    pub fn rank(&self) -> i32 {
        self.order
    }

    /// Whether the index is unique
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Declared ordering entries (empty means insertion order)
    pub fn ordering(&self) -> &[String] {
        &self.order_by
    }
}

/// A stored attribute
#[derive(Debug, Clone)]
pub struct AttributeDef {
    name: String,
    kind: AttributeKind,
    identity: bool,
    indexes: Vec<IndexMarker>,
}

impl AttributeDef {
    /// Declare an attribute
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        AttributeDef {
            name: name.into(),
            kind,
            identity: false,
            indexes: Vec::new(),
        }
    }

    /// Mark this attribute as the identity (primary key)
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Attach an index marker
    pub fn index(mut self, marker: IndexMarker) -> Self {
        self.indexes.push(marker);
        self
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Carries the identity marker?
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Attached index markers
    pub fn indexes(&self) -> &[IndexMarker] {
        &self.indexes
    }
}

/// A computed attribute
#[derive(Clone)]
pub struct GetterDef {
    name: String,
    getter: GetterFn,
    identity: bool,
    indexes: Vec<IndexMarker>,
}

impl GetterDef {
    /// Declare a getter computing a value from the record
    pub fn new<F>(name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        GetterDef {
            name: name.into(),
            getter: Arc::new(getter),
            identity: false,
            indexes: Vec::new(),
        }
    }

    /// Mark this getter as the identity (primary key)
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Attach an index marker
    pub fn index(mut self, marker: IndexMarker) -> Self {
        self.indexes.push(marker);
        self
    }

    /// Getter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Carries the identity marker?
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Attached index markers
    pub fn indexes(&self) -> &[IndexMarker] {
        &self.indexes
    }

    pub(crate) fn function(&self) -> GetterFn {
        Arc::clone(&self.getter)
    }
}

impl fmt::Debug for GetterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterDef")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("indexes", &self.indexes)
            .finish()
    }
}

/// Metadata table of one resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    resource: ResourceType,
    attributes: Vec<AttributeDef>,
    getters: Vec<GetterDef>,
}

impl ResourceSchema {
    /// Start declaring a schema for resource type `name`
    pub fn builder(name: impl AsRef<str>) -> ResourceSchemaBuilder {
        ResourceSchemaBuilder {
            schema: ResourceSchema {
                resource: ResourceType::new(name),
                attributes: Vec::new(),
                getters: Vec::new(),
            },
        }
    }

    /// The described resource type
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource
    }

    /// Declared attributes in declaration order
    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    /// Declared getters in declaration order
    pub fn getters(&self) -> &[GetterDef] {
        &self.getters
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Declared kind of attribute `name`
    pub fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        self.attribute(name).map(AttributeDef::kind)
    }

    /// Accessor reading `name`, whether stored or computed
    pub fn accessor(&self, name: &str) -> Option<Accessor> {
        if let Some(attribute) = self.attribute(name) {
            return Some(Accessor::attribute(attribute.name()));
        }
        self.getters
            .iter()
            .find(|g| g.name == name)
            .map(|g| Accessor::computed(g.name(), g.function()))
    }

    /// Create an empty record of this type
    pub fn new_record(&self) -> Record {
        Record::new(self.resource.clone())
    }
}

/// Builder for [`ResourceSchema`]
#[derive(Debug)]
pub struct ResourceSchemaBuilder {
    schema: ResourceSchema,
}

impl ResourceSchemaBuilder {
    /// Add a stored attribute
    pub fn attribute(mut self, attribute: AttributeDef) -> Self {
        self.schema.attributes.push(attribute);
        self
    }

    /// Add a computed getter
    pub fn getter(mut self, getter: GetterDef) -> Self {
        self.schema.getters.push(getter);
        self
    }

    /// Finish the schema
    pub fn build(self) -> ResourceSchema {
        self.schema
    }
}
