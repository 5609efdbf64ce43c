//! Sort comparator for non-unique index buckets
//!
//! Composes an ordered list of (accessor, direction) pairs into one
//! comparator over records. The first pair whose values differ decides;
//! null sorts before any non-null value, and descending pairs flip the
//! result (nulls included).

use std::cmp::Ordering;

use restable_core::{Error, Record, Result};

use crate::accessor::Accessor;
use crate::schema::ResourceSchema;

/// Direction of one ordering key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl SortDirection {
    /// Parse `asc` / `desc` (case-insensitive)
    pub fn parse(keyword: &str) -> Option<Self> {
        if keyword.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Asc)
        } else if keyword.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }

    /// Scale an ordering by this direction
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Ordered list of (accessor, direction) pairs
#[derive(Debug, Clone, PartialEq)]
pub struct SortComparator {
    keys: Vec<(Accessor, SortDirection)>,
}

impl SortComparator {
    /// Build from explicit pairs
    pub fn new(keys: Vec<(Accessor, SortDirection)>) -> Self {
        SortComparator { keys }
    }

    /// Build from `"<attribute> <asc|desc>"` entries resolved against `schema`
    ///
    /// # Errors
    ///
    /// Configuration error for an entry that is not exactly two words, an
    /// unknown direction keyword, or a name that is neither an attribute nor
    /// a getter of the schema.
    pub fn parse<S: AsRef<str>>(schema: &ResourceSchema, entries: &[S]) -> Result<Self> {
        let resource = schema.resource_type();
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref();
            let parts: Vec<&str> = entry.split_whitespace().collect();
            let [attribute, keyword] = parts.as_slice() else {
                return Err(Error::configuration(format!(
                    "{}: ordering entry '{}' must be '<attribute> <asc|desc>'",
                    resource, entry
                )));
            };
            let direction = SortDirection::parse(keyword).ok_or_else(|| {
                Error::configuration(format!(
                    "{}: unknown ordering direction '{}' in '{}'",
                    resource, keyword, entry
                ))
            })?;
            let accessor = schema.accessor(attribute).ok_or_else(|| {
                Error::configuration(format!(
                    "{}: ordering refers to unknown attribute '{}'",
                    resource, attribute
                ))
            })?;
            keys.push((accessor, direction));
        }
        Ok(SortComparator { keys })
    }

    /// Compare two records
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (accessor, direction) in &self.keys {
            let left = accessor.read(a);
            let right = accessor.read(b);
            if left == right {
                continue;
            }
            let ordering = match (left.is_null(), right.is_null()) {
                (true, _) => Ordering::Less,
                (_, true) => Ordering::Greater,
                _ => left.natural_cmp(&right),
            };
            if ordering != Ordering::Equal {
                return direction.apply(ordering);
            }
        }
        Ordering::Equal
    }

    /// Stable-sort a slice of records (anything dereferencing to `Record`)
    pub fn sort<R: AsRef<Record>>(&self, records: &mut [R]) {
        records.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
    }

    /// Number of ordering keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// No ordering keys?
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The ordering keys
    pub fn keys(&self) -> &[(Accessor, SortDirection)] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, GetterDef};
    use restable_core::{AttributeKind, Value};
    use std::sync::Arc;

    fn schema() -> ResourceSchema {
        ResourceSchema::builder("Task")
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(AttributeDef::new("category", AttributeKind::String))
            .attribute(AttributeDef::new("priority", AttributeKind::Int))
            .getter(GetterDef::new("neg", |r: &Record| {
                r.get("priority").as_int().map(|p| Value::Int(-p)).unwrap_or(Value::Null)
            }))
            .build()
    }

    fn task(id: i64, category: &str, priority: Option<i64>) -> Record {
        schema()
            .new_record()
            .with("id", id)
            .with("category", category)
            .with("priority", priority)
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(SortDirection::parse("ASC"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("desc"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("down"), None);
    }

    #[test]
    fn test_ascending_then_descending() {
        let cmp = SortComparator::parse(&schema(), &["category asc", "priority desc"]).unwrap();
        let a = task(1, "a", Some(1));
        let b = task(2, "a", Some(5));
        let c = task(3, "b", Some(9));
        assert_eq!(cmp.compare(&b, &a), Ordering::Less);
        assert_eq!(cmp.compare(&a, &c), Ordering::Less);
        assert_eq!(cmp.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_null_sorts_first_ascending() {
        let cmp = SortComparator::parse(&schema(), &["priority asc"]).unwrap();
        let none = task(1, "a", None);
        let low = task(2, "a", Some(-100));
        assert_eq!(cmp.compare(&none, &low), Ordering::Less);
        assert_eq!(cmp.compare(&low, &none), Ordering::Greater);
    }

    #[test]
    fn test_null_sorts_last_descending() {
        let cmp = SortComparator::parse(&schema(), &["priority desc"]).unwrap();
        let none = task(1, "a", None);
        let low = task(2, "a", Some(-100));
        assert_eq!(cmp.compare(&none, &low), Ordering::Greater);
    }

    #[test]
    fn test_getter_in_ordering() {
        let cmp = SortComparator::parse(&schema(), &["neg asc"]).unwrap();
        let mut records = vec![
            Arc::new(task(1, "a", Some(1))),
            Arc::new(task(2, "a", Some(3))),
            Arc::new(task(3, "a", Some(2))),
        ];
        cmp.sort(&mut records);
        let ids: Vec<i64> = records.iter().map(|r| r.get("id").as_int().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_records() {
        let cmp = SortComparator::parse(&schema(), &["category asc"]).unwrap();
        let mut records = vec![
            Arc::new(task(1, "b", None)),
            Arc::new(task(2, "a", None)),
            Arc::new(task(3, "b", None)),
            Arc::new(task(4, "a", None)),
        ];
        cmp.sort(&mut records);
        let ids: Vec<i64> = records.iter().map(|r| r.get("id").as_int().unwrap()).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_malformed_entries_rejected() {
        let schema = schema();
        let arity = SortComparator::parse(&schema, &["priority"]).unwrap_err();
        assert!(arity.is_configuration());
        assert!(arity.to_string().contains("must be"));

        let too_many = SortComparator::parse(&schema, &["priority desc nulls"]).unwrap_err();
        assert!(too_many.is_configuration());

        let keyword = SortComparator::parse(&schema, &["priority down"]).unwrap_err();
        assert!(keyword.to_string().contains("unknown ordering direction"));

        let unknown = SortComparator::parse(&schema, &["weight asc"]).unwrap_err();
        assert!(unknown.to_string().contains("unknown attribute 'weight'"));
    }
}
