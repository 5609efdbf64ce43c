//! Identity and index accessor construction
//!
//! Turns the markers of a [`ResourceSchema`] into one identity accessor and
//! a name → [`IndexAccessor`] map. All marker problems surface here, before
//! any data is loaded:
//! - zero or several identity candidates (attributes and getters together)
//! - duplicate attribute/getter names
//! - an index name declared by a getter and by anything else
//! - malformed ordering entries
//!
//! Attribute markers sharing a name form one composite index, read in
//! ascending rank (ties keep declaration order). A composite is unique if
//! any contributor says so, and takes its ordering from the first
//! contributor that declares one.

use std::collections::{BTreeMap, HashSet};

use smallvec::SmallVec;
use tracing::debug;

use restable_core::{Error, IndexKey, Record, Result, Value};

use crate::accessor::Accessor;
use crate::comparator::SortComparator;
use crate::schema::{IndexMarker, ResourceSchema};

/// Where an index reads its key from
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSource {
    /// One stored attribute
    Single(Accessor),
    /// Several stored attributes, already in rank order
    Composite(Vec<Accessor>),
    /// A getter; an array result is joined element by element
    Method(Accessor),
}

/// Computes the key of one named index
#[derive(Debug, Clone)]
pub struct IndexAccessor {
    name: String,
    unique: bool,
    source: IndexSource,
    comparator: Option<SortComparator>,
}

impl IndexAccessor {
    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique index?
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Key source
    pub fn source(&self) -> &IndexSource {
        &self.source
    }

    /// Ordering of records sharing a key, if declared
    pub fn comparator(&self) -> Option<&SortComparator> {
        self.comparator.as_ref()
    }

    /// Whether an ordering was declared
    pub fn has_comparator(&self) -> bool {
        self.comparator.is_some()
    }

    /// Compute the index key of a record
    pub fn key(&self, record: &Record) -> IndexKey {
        match &self.source {
            IndexSource::Single(accessor) => IndexKey::from_values(&[accessor.read(record)]),
            IndexSource::Composite(accessors) => {
                let values: SmallVec<[Value; 4]> =
                    accessors.iter().map(|a| a.read(record)).collect();
                IndexKey::from_values(&values)
            }
            IndexSource::Method(accessor) => match accessor.read(record) {
                Value::Array(parts) => IndexKey::from_values(&parts),
                value => IndexKey::from_values(&[value]),
            },
        }
    }
}

/// Identity accessor plus every index accessor of one resource type
#[derive(Debug, Clone)]
pub struct AccessorSet {
    identity: Accessor,
    indexes: BTreeMap<String, IndexAccessor>,
}

impl AccessorSet {
    /// Build and check all accessors of `schema`
    pub fn build(schema: &ResourceSchema) -> Result<Self> {
        check_names(schema)?;
        let identity = build_identity(schema)?;
        let indexes = build_indexes(schema)?;
        debug!(
            target: "restable::index",
            resource = %schema.resource_type(),
            identity = identity.name(),
            indexes = indexes.len(),
            "Built accessors"
        );
        Ok(AccessorSet { identity, indexes })
    }

    /// The identity accessor
    pub fn identity(&self) -> &Accessor {
        &self.identity
    }

    /// Look up an index accessor
    pub fn index(&self, name: &str) -> Option<&IndexAccessor> {
        self.indexes.get(name)
    }

    /// All index accessors, by name
    pub fn indexes(&self) -> impl Iterator<Item = &IndexAccessor> {
        self.indexes.values()
    }

    /// All index names, sorted
    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }
}

fn check_names(schema: &ResourceSchema) -> Result<()> {
    let mut seen = HashSet::new();
    let names = schema
        .attributes()
        .iter()
        .map(|a| a.name())
        .chain(schema.getters().iter().map(|g| g.name()));
    for name in names {
        if !seen.insert(name) {
            return Err(Error::configuration(format!(
                "{}: attribute or getter '{}' declared twice",
                schema.resource_type(),
                name
            )));
        }
    }
    Ok(())
}

/// Build the identity accessor
///
/// Exactly one attribute or getter must carry the identity marker.
pub fn build_identity(schema: &ResourceSchema) -> Result<Accessor> {
    let mut candidates: Vec<&str> = schema
        .attributes()
        .iter()
        .filter(|a| a.is_identity())
        .map(|a| a.name())
        .collect();
    candidates.extend(
        schema
            .getters()
            .iter()
            .filter(|g| g.is_identity())
            .map(|g| g.name()),
    );

    match candidates.as_slice() {
        [] => Err(Error::configuration(format!(
            "{}: missing identity declaration",
            schema.resource_type()
        ))),
        [name] => schema.accessor(name).ok_or_else(|| {
            Error::configuration(format!(
                "{}: identity '{}' cannot be resolved",
                schema.resource_type(),
                name
            ))
        }),
        several => Err(Error::configuration(format!(
            "{}: identity declared more than once ({})",
            schema.resource_type(),
            several.join(", ")
        ))),
    }
}

/// Build every index accessor, keyed by index name
pub fn build_indexes(schema: &ResourceSchema) -> Result<BTreeMap<String, IndexAccessor>> {
    let resource = schema.resource_type();

    // Attribute markers grouped by index name, in declaration order
    let mut groups: BTreeMap<&str, Vec<(&str, &IndexMarker)>> = BTreeMap::new();
    for attribute in schema.attributes() {
        for marker in attribute.indexes() {
            groups
                .entry(marker.name())
                .or_default()
                .push((attribute.name(), marker));
        }
    }

    let mut result = BTreeMap::new();
    for (name, mut contributors) in groups {
        contributors.sort_by_key(|(_, marker)| marker.rank());
        let unique = contributors.iter().any(|(_, m)| m.is_unique());
        let ordering = contributors
            .iter()
            .map(|(_, m)| m.ordering())
            .find(|o| !o.is_empty());
        let comparator = match ordering {
            Some(entries) => Some(SortComparator::parse(schema, entries)?),
            None => None,
        };
        let source = match contributors.as_slice() {
            [(attribute, _)] => IndexSource::Single(Accessor::attribute(*attribute)),
            many => IndexSource::Composite(
                many.iter()
                    .map(|(attribute, _)| Accessor::attribute(*attribute))
                    .collect(),
            ),
        };
        result.insert(
            name.to_string(),
            IndexAccessor {
                name: name.to_string(),
                unique,
                source,
                comparator,
            },
        );
    }

    for getter in schema.getters() {
        for marker in getter.indexes() {
            if result.contains_key(marker.name()) {
                return Err(Error::configuration(format!(
                    "{}: index name '{}' declared more than once",
                    resource,
                    marker.name()
                )));
            }
            let comparator = if marker.ordering().is_empty() {
                None
            } else {
                Some(SortComparator::parse(schema, marker.ordering())?)
            };
            let accessor = schema.accessor(getter.name()).ok_or_else(|| {
                Error::configuration(format!(
                    "{}: getter '{}' cannot be resolved",
                    resource,
                    getter.name()
                ))
            })?;
            result.insert(
                marker.name().to_string(),
                IndexAccessor {
                    name: marker.name().to_string(),
                    unique: marker.is_unique(),
                    source: IndexSource::Method(accessor),
                    comparator,
                },
            );
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, GetterDef};
    use restable_core::AttributeKind;

    fn base() -> crate::schema::ResourceSchemaBuilder {
        ResourceSchema::builder("Item")
    }

    // ========================================
    // Identity
    // ========================================

    #[test]
    fn test_identity_from_attribute() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        assert_eq!(set.identity(), &Accessor::attribute("id"));
    }

    #[test]
    fn test_identity_from_getter() {
        let schema = base()
            .attribute(AttributeDef::new("a", AttributeKind::Int))
            .getter(GetterDef::new("key", |r: &Record| r.get("a").clone()).identity())
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        assert!(set.identity().is_computed());
        let record = schema.new_record().with("a", 9);
        assert_eq!(set.identity().read(&record), Value::Int(9));
    }

    #[test]
    fn test_missing_identity_rejected() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int))
            .build();
        let err = AccessorSet::build(&schema).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("missing identity"));
    }

    #[test]
    fn test_two_identity_attributes_rejected() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(AttributeDef::new("code", AttributeKind::String).identity())
            .build();
        let err = AccessorSet::build(&schema).unwrap_err();
        assert!(err.to_string().contains("more than once (id, code)"));
    }

    #[test]
    fn test_attribute_and_getter_identity_rejected() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .getter(GetterDef::new("key", |r: &Record| r.get("id").clone()).identity())
            .build();
        assert!(AccessorSet::build(&schema).unwrap_err().is_configuration());
    }

    #[test]
    fn test_duplicate_attribute_names_rejected() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .getter(GetterDef::new("id", |_: &Record| Value::Null))
            .build();
        let err = AccessorSet::build(&schema).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    // ========================================
    // Indexes
    // ========================================

    #[test]
    fn test_single_attribute_index() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(
                AttributeDef::new("model", AttributeKind::String)
                    .index(IndexMarker::new("name").unique()),
            )
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        let index = set.index("name").unwrap();
        assert!(index.is_unique());
        assert!(!index.has_comparator());
        assert_eq!(index.source(), &IndexSource::Single(Accessor::attribute("model")));

        let record = schema.new_record().with("id", 1).with("model", "B");
        assert_eq!(index.key(&record).as_str(), "B");
    }

    #[test]
    fn test_composite_index_uses_rank_order() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(
                AttributeDef::new("level", AttributeKind::Int)
                    .index(IndexMarker::new("kind-level").order(2)),
            )
            .attribute(
                AttributeDef::new("kind", AttributeKind::String)
                    .index(IndexMarker::new("kind-level").order(1)),
            )
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        let index = set.index("kind-level").unwrap();
        assert!(!index.is_unique());

        let record = schema.new_record().with("id", 1).with("kind", "sword").with("level", 3);
        assert_eq!(index.key(&record).as_str(), "sword^3");
    }

    #[test]
    fn test_composite_unique_if_any_contributor_unique() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(AttributeDef::new("a", AttributeKind::Int).index(IndexMarker::new("ab")))
            .attribute(
                AttributeDef::new("b", AttributeKind::Int)
                    .index(IndexMarker::new("ab").order(1).unique()),
            )
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        assert!(set.index("ab").unwrap().is_unique());
    }

    #[test]
    fn test_one_attribute_in_several_indexes() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(
                AttributeDef::new("kind", AttributeKind::String)
                    .index(IndexMarker::new("by-kind"))
                    .index(IndexMarker::new("kind-level")),
            )
            .attribute(
                AttributeDef::new("level", AttributeKind::Int)
                    .index(IndexMarker::new("kind-level").order(1)),
            )
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        assert_eq!(set.index_names(), vec!["by-kind", "kind-level"]);
    }

    #[test]
    fn test_method_index_key() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(AttributeDef::new("x", AttributeKind::Int))
            .attribute(AttributeDef::new("y", AttributeKind::Int))
            .getter(
                GetterDef::new("coords", |r: &Record| {
                    Value::Array(vec![r.get("x").clone(), r.get("y").clone()])
                })
                .index(IndexMarker::new("position").unique()),
            )
            .getter(
                GetterDef::new("parity", |r: &Record| {
                    Value::from(r.get("x").as_int().unwrap_or(0) % 2 == 0)
                })
                .index(IndexMarker::new("even")),
            )
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        let record = schema.new_record().with("id", 1).with("x", 4).with("y", 7);
        assert_eq!(set.index("position").unwrap().key(&record).as_str(), "4^7");
        assert_eq!(set.index("even").unwrap().key(&record).as_str(), "true");
    }

    #[test]
    fn test_field_and_method_index_name_collision_rejected() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(
                AttributeDef::new("model", AttributeKind::String).index(IndexMarker::new("name")),
            )
            .getter(
                GetterDef::new("upper", |r: &Record| {
                    Value::from(r.get("model").as_str().map(str::to_uppercase))
                })
                .index(IndexMarker::new("name")),
            )
            .build();
        let err = AccessorSet::build(&schema).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("index name 'name'"));
    }

    #[test]
    fn test_two_getters_same_index_rejected() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .getter(GetterDef::new("a", |_: &Record| Value::Null).index(IndexMarker::new("g")))
            .getter(GetterDef::new("b", |_: &Record| Value::Null).index(IndexMarker::new("g")))
            .build();
        assert!(AccessorSet::build(&schema).unwrap_err().is_configuration());
    }

    #[test]
    fn test_ordering_taken_from_first_ranked_contributor() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(
                AttributeDef::new("category", AttributeKind::String).index(
                    IndexMarker::new("cat-idx")
                        .order(1)
                        .order_by(["category asc", "priority desc"]),
                ),
            )
            .attribute(AttributeDef::new("priority", AttributeKind::Int))
            .build();
        let set = AccessorSet::build(&schema).unwrap();
        let comparator = set.index("cat-idx").unwrap().comparator().unwrap();
        assert_eq!(comparator.len(), 2);
    }

    #[test]
    fn test_bad_ordering_rejected_at_build() {
        let schema = base()
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(
                AttributeDef::new("category", AttributeKind::String)
                    .index(IndexMarker::new("cat-idx").order_by(["weight desc"])),
            )
            .build();
        assert!(AccessorSet::build(&schema).unwrap_err().is_configuration());
    }
}
