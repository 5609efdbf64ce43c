//! Resource definitions
//!
//! A [`ResourceDefinition`] is the immutable description of one resource
//! type as handed to the registry: its schema, where the backing file lives,
//! which reader decodes it, and which attributes are injected from the
//! application context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use restable_core::ResourceType;
use restable_index::ResourceSchema;

/// When an injected attribute is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectScope {
    /// Once per resource type, when the storage is initialized
    Static,
    /// For every record on every reload
    Instance,
}

/// An attribute whose value comes from the injection resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectDefinition {
    attribute: String,
    reference: String,
    scope: InjectScope,
}

impl InjectDefinition {
    /// Inject `reference` into `attribute`
    pub fn new(
        attribute: impl Into<String>,
        reference: impl Into<String>,
        scope: InjectScope,
    ) -> Self {
        InjectDefinition {
            attribute: attribute.into(),
            reference: reference.into(),
            scope,
        }
    }

    /// Resolved once per type
    pub fn shared(attribute: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(attribute, reference, InjectScope::Static)
    }

    /// Resolved for every record
    pub fn instance(attribute: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(attribute, reference, InjectScope::Instance)
    }

    /// Target attribute
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Symbolic reference handed to the resolver
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Resolution scope
    pub fn scope(&self) -> InjectScope {
        self.scope
    }
}

/// Immutable description of one resource type
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    schema: Arc<ResourceSchema>,
    location: PathBuf,
    format: String,
    validate: bool,
    injections: Vec<InjectDefinition>,
}

impl ResourceDefinition {
    /// Define a resource backed by `location`, decoded by the `format` reader
    pub fn new(
        schema: impl Into<Arc<ResourceSchema>>,
        location: impl Into<PathBuf>,
        format: impl Into<String>,
    ) -> Self {
        ResourceDefinition {
            schema: schema.into(),
            location: location.into(),
            format: format.into(),
            validate: true,
            injections: Vec::new(),
        }
    }

    /// Enable or disable record validation on reload (enabled by default)
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Add an injected attribute
    pub fn inject(mut self, injection: InjectDefinition) -> Self {
        self.injections.push(injection);
        self
    }

    /// The resource type
    pub fn resource_type(&self) -> &ResourceType {
        self.schema.resource_type()
    }

    /// The schema
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Backing file
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Reader format name
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Whether records are validated on reload
    pub fn validates(&self) -> bool {
        self.validate
    }

    /// All injected attributes
    pub fn injections(&self) -> &[InjectDefinition] {
        &self.injections
    }

    /// Injected attributes of one scope
    pub fn injections_of(&self, scope: InjectScope) -> impl Iterator<Item = &InjectDefinition> {
        self.injections.iter().filter(move |i| i.scope == scope)
    }
}
