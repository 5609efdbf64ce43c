//! Per-type indexed storage
//!
//! A [`Storage`] owns the loaded records of one resource type together with
//! its primary map and every declared secondary index.
//!
//! # Reload protocol
//!
//! Reloads build a complete new [`Contents`] in a scratch container while
//! readers keep using the published one:
//!
//! 1. Take the upgradable read guard (serializes reloads, readers continue)
//! 2. Decode, inject, validate and index every record into the scratch
//! 3. Sort the buckets of ordered non-unique indexes
//! 4. Upgrade to a write guard and swap the scratch in
//! 5. Downgrade and notify observers (they may query this storage)
//!
//! Any failure before step 4 drops the scratch; the previous contents stay
//! published and fully queryable.

use std::collections::BTreeMap;
use std::fs::File;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use restable_core::{
    Error, IndexKey, InjectResolver, IntegrityViolation, MapResolver, NoopValidator, Record,
    ResourceType, Result, Validator, Value,
};
use restable_index::AccessorSet;
use restable_readers::{ReaderHolder, ResourceReader};

use crate::definition::{InjectScope, ResourceDefinition};

/// Reload observer; invoked with no payload after every successful reload
///
/// Returning `false` unregisters the observer.
pub type Observer = Arc<dyn Fn() -> bool + Send + Sync>;

/// External capabilities shared by every storage of a registry
#[derive(Clone)]
pub struct StorageContext {
    /// Format readers
    pub readers: Arc<ReaderHolder>,
    /// Record validator
    pub validator: Arc<dyn Validator>,
    /// Injection resolver
    pub resolver: Arc<dyn InjectResolver>,
}

impl StorageContext {
    /// Bundle the three capabilities
    pub fn new(
        readers: Arc<ReaderHolder>,
        validator: Arc<dyn Validator>,
        resolver: Arc<dyn InjectResolver>,
    ) -> Self {
        StorageContext {
            readers,
            validator,
            resolver,
        }
    }

    /// Replace the validator
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replace the injection resolver
    pub fn with_resolver(mut self, resolver: impl InjectResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replace the reader holder
    pub fn with_readers(mut self, readers: Arc<ReaderHolder>) -> Self {
        self.readers = readers;
        self
    }
}

impl Default for StorageContext {
    /// Built-in readers, no validation, empty resolver
    fn default() -> Self {
        StorageContext::new(
            Arc::new(ReaderHolder::new()),
            Arc::new(NoopValidator),
            Arc::new(MapResolver::new()),
        )
    }
}

impl std::fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContext")
            .field("readers", &self.readers)
            .finish_non_exhaustive()
    }
}

/// Everything fixed by the first successful initialize
struct Binding {
    definition: ResourceDefinition,
    reader: Arc<dyn ResourceReader>,
    accessors: AccessorSet,
    statics: BTreeMap<String, Value>,
}

/// One complete, consistent generation of loaded data
#[derive(Default)]
struct Contents {
    /// Records in load order
    records: Vec<Arc<Record>>,
    primary: FxHashMap<Value, Arc<Record>>,
    unique: FxHashMap<String, FxHashMap<IndexKey, Arc<Record>>>,
    multi: FxHashMap<String, FxHashMap<IndexKey, Vec<Arc<Record>>>>,
}

impl Contents {
    fn insert(
        &mut self,
        resource: &ResourceType,
        accessors: &AccessorSet,
        record: Record,
    ) -> Result<()> {
        let id = accessors.identity().read(&record);
        if id.is_null() {
            return Err(Error::integrity(resource, IntegrityViolation::NullIdentity));
        }
        if self.primary.contains_key(&id) {
            return Err(Error::integrity(
                resource,
                IntegrityViolation::DuplicateIdentity { id },
            ));
        }

        let record = Arc::new(record);
        for index in accessors.indexes() {
            let key = index.key(&record);
            if index.is_unique() {
                let map = self.unique.entry(index.name().to_string()).or_default();
                if map.contains_key(&key) {
                    return Err(Error::integrity(
                        resource,
                        IntegrityViolation::DuplicateUniqueKey {
                            index: index.name().to_string(),
                            key,
                        },
                    ));
                }
                map.insert(key, Arc::clone(&record));
            } else {
                self.multi
                    .entry(index.name().to_string())
                    .or_default()
                    .entry(key)
                    .or_default()
                    .push(Arc::clone(&record));
            }
        }

        self.primary.insert(id, Arc::clone(&record));
        self.records.push(record);
        Ok(())
    }

    fn sort(&mut self, accessors: &AccessorSet) {
        for index in accessors.indexes() {
            let (Some(comparator), Some(buckets)) =
                (index.comparator(), self.multi.get_mut(index.name()))
            else {
                continue;
            };
            for bucket in buckets.values_mut() {
                comparator.sort(bucket);
            }
        }
    }
}

/// Indexed container of one resource type
///
/// Created empty, bound by [`Storage::initialize`], then reloaded any number
/// of times. All reads return shared immutable records or fresh vectors.
pub struct Storage {
    context: StorageContext,
    binding: OnceCell<Binding>,
    init_lock: Mutex<()>,
    state: RwLock<Contents>,
    observers: Mutex<Vec<Observer>>,
}

impl Storage {
    /// Create an empty, unbound storage
    pub fn new(context: StorageContext) -> Self {
        Storage {
            context,
            binding: OnceCell::new(),
            init_lock: Mutex::new(()),
            state: RwLock::new(Contents::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind `definition` and perform the first load
    ///
    /// Resolves the reader, builds the identity and index accessors and
    /// resolves static injections, then loads the backing file. Once this
    /// has succeeded, further calls are no-ops. A failed call leaves the
    /// storage unbound and may be retried.
    pub fn initialize(&self, definition: &ResourceDefinition) -> Result<()> {
        // Checked before and after taking the init lock
        let init = self.binding.get().is_none().then(|| self.init_lock.lock());
        let Some(_init) = init.filter(|_| self.binding.get().is_none()) else {
            debug!(
                target: "restable::storage",
                resource = %definition.resource_type(),
                "Already initialized"
            );
            return Ok(());
        };

        let binding = self.bind(definition)?;
        let contents = self.build(&binding)?;
        let records = contents.records.len();
        *self.state.write() = contents;
        if self.binding.set(binding).is_err() {
            return Err(Error::configuration(format!(
                "{}: storage bound concurrently",
                definition.resource_type()
            )));
        }

        info!(
            target: "restable::storage",
            resource = %definition.resource_type(),
            records,
            location = ?definition.location(),
            "Initialized storage"
        );
        self.notify();
        Ok(())
    }

    /// Re-read the backing file and publish a new generation
    ///
    /// Blocks other reloads but not readers until the new generation is
    /// complete. On error the previous generation stays published.
    pub fn reload(&self) -> Result<()> {
        let binding = self.binding()?;
        let guard = self.state.upgradable_read();
        let contents = self.build(binding)?;
        let records = contents.records.len();

        let mut write = RwLockUpgradableReadGuard::upgrade(guard);
        *write = contents;
        let guard = RwLockWriteGuard::downgrade_to_upgradable(write);

        info!(
            target: "restable::storage",
            resource = %binding.definition.resource_type(),
            records,
            indexes = binding.accessors.indexes().count(),
            "Reloaded storage"
        );
        self.notify();
        drop(guard);
        Ok(())
    }

    fn bind(&self, definition: &ResourceDefinition) -> Result<Binding> {
        let schema = definition.schema();
        let resource = definition.resource_type();
        let reader = self.context.readers.get(definition.format())?;
        let accessors = AccessorSet::build(schema)?;

        for injection in definition.injections() {
            if schema.kind_of(injection.attribute()).is_none() {
                return Err(Error::configuration(format!(
                    "{}: injected attribute '{}' is not declared",
                    resource,
                    injection.attribute()
                )));
            }
        }

        let mut statics = BTreeMap::new();
        for injection in definition.injections_of(InjectScope::Static) {
            let value = self.resolve(definition, injection.attribute(), injection.reference())?;
            statics.insert(injection.attribute().to_string(), value);
        }

        Ok(Binding {
            definition: definition.clone(),
            reader,
            accessors,
            statics,
        })
    }

    fn resolve(
        &self,
        definition: &ResourceDefinition,
        attribute: &str,
        reference: &str,
    ) -> Result<Value> {
        let kind = definition.schema().kind_of(attribute).ok_or_else(|| {
            Error::configuration(format!(
                "{}: injected attribute '{}' is not declared",
                definition.resource_type(),
                attribute
            ))
        })?;
        self.context.resolver.resolve(reference, kind).map_err(|e| {
            Error::configuration(format!(
                "{}: cannot inject '{}' into '{}': {}",
                definition.resource_type(),
                reference,
                attribute,
                e
            ))
        })
    }

    /// Decode, inject, validate and index the backing file into a new generation
    fn build(&self, binding: &Binding) -> Result<Contents> {
        let definition = &binding.definition;
        let resource = definition.resource_type();
        let location = definition.location();

        let file = File::open(location).map_err(|e| {
            Error::decode(resource.name(), location.display().to_string(), e.to_string())
        })?;
        let stream = binding.reader.read(Box::new(file), definition.schema())?;

        let mut contents = Contents::default();
        for item in stream {
            let mut record = item?;
            for injection in definition.injections_of(InjectScope::Instance) {
                let value = self.resolve(definition, injection.attribute(), injection.reference())?;
                record.set(injection.attribute(), value);
            }
            if definition.validates() {
                let violations = self.context.validator.validate(&record);
                if !violations.is_empty() {
                    return Err(Error::Validation {
                        resource: resource.clone(),
                        id: binding.accessors.identity().read(&record),
                        violations,
                    });
                }
            }
            contents.insert(resource, &binding.accessors, record)?;
        }
        contents.sort(&binding.accessors);
        Ok(contents)
    }

    fn binding(&self) -> Result<&Binding> {
        self.binding.get().ok_or_else(|| Error::NotReady {
            resource: String::from("unbound storage"),
        })
    }

    fn notify(&self) {
        let observers: Vec<Observer> = self.observers.lock().clone();
        let finished: Vec<Observer> = observers
            .into_iter()
            .filter(|observer| !observer())
            .collect();
        if !finished.is_empty() {
            // Observers may register others while running, so prune by address.
            let address = |observer: &Observer| Arc::as_ptr(observer) as *const () as usize;
            let finished: Vec<usize> = finished.iter().map(address).collect();
            self.observers
                .lock()
                .retain(|observer| !finished.contains(&address(observer)));
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Record with identity `id`
    pub fn get(&self, id: impl Into<Value>) -> Result<Option<Arc<Record>>> {
        self.binding()?;
        let id = id.into();
        Ok(self.state.read().primary.get(&id).cloned())
    }

    /// Record with identity `id`, or a not-found error
    pub fn get_required(&self, id: impl Into<Value>) -> Result<Arc<Record>> {
        let binding = self.binding()?;
        let id = id.into();
        let found = self.state.read().primary.get(&id).cloned();
        found.ok_or_else(|| Error::NotFound {
            resource: binding.definition.resource_type().clone(),
            id,
        })
    }

    /// Whether a record with identity `id` is loaded
    pub fn contains_id(&self, id: impl Into<Value>) -> Result<bool> {
        self.binding()?;
        let id = id.into();
        Ok(self.state.read().primary.contains_key(&id))
    }

    /// All loaded records in load order
    pub fn get_all(&self) -> Result<Vec<Arc<Record>>> {
        self.binding()?;
        Ok(self.state.read().records.clone())
    }

    /// Record stored under `values` in unique index `index`
    ///
    /// An undeclared or non-unique index name finds nothing.
    pub fn get_unique(&self, index: &str, values: &[Value]) -> Result<Option<Arc<Record>>> {
        let binding = self.binding()?;
        if !binding.accessors.index(index).map_or(false, |i| i.is_unique()) {
            debug!(
                target: "restable::storage",
                resource = %binding.definition.resource_type(),
                index,
                "No unique index with this name"
            );
            return Ok(None);
        }
        let key = IndexKey::from_values(values);
        let state = self.state.read();
        Ok(state.unique.get(index).and_then(|m| m.get(&key)).cloned())
    }

    /// Records stored under `values` in non-unique index `index`
    ///
    /// Returns a fresh vector, sorted when the index declares an ordering.
    /// An undeclared or unique index name finds nothing.
    pub fn get_index(&self, index: &str, values: &[Value]) -> Result<Vec<Arc<Record>>> {
        let binding = self.binding()?;
        if binding.accessors.index(index).map_or(true, |i| i.is_unique()) {
            debug!(
                target: "restable::storage",
                resource = %binding.definition.resource_type(),
                index,
                "No non-unique index with this name"
            );
            return Ok(Vec::new());
        }
        let key = IndexKey::from_values(values);
        let state = self.state.read();
        Ok(state
            .multi
            .get(index)
            .and_then(|m| m.get(&key))
            .cloned()
            .unwrap_or_default())
    }

    /// Number of loaded records
    pub fn len(&self) -> Result<usize> {
        self.binding()?;
        Ok(self.state.read().records.len())
    }

    /// No records loaded?
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Whether the first initialize has succeeded
    pub fn is_initialized(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Bound resource type
    pub fn resource_type(&self) -> Option<&ResourceType> {
        self.binding.get().map(|b| b.definition.resource_type())
    }

    /// Bound definition
    pub fn definition(&self) -> Option<&ResourceDefinition> {
        self.binding.get().map(|b| &b.definition)
    }

    /// Backing file of the bound definition
    pub fn location(&self) -> Option<&std::path::Path> {
        self.binding.get().map(|b| b.definition.location())
    }

    /// Declared index names, sorted
    pub fn index_names(&self) -> Vec<String> {
        self.binding
            .get()
            .map(|b| b.accessors.index_names().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Value of a static injection, resolved at initialize
    pub fn static_value(&self, attribute: &str) -> Option<&Value> {
        self.binding.get().and_then(|b| b.statics.get(attribute))
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register a callback run after every successful load
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_observer_while(move || {
            observer();
            true
        });
    }

    /// Register a callback that stays registered while it returns `true`
    pub fn add_observer_while<F>(&self, observer: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.observers.lock().push(Arc::new(observer));
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("resource", &self.resource_type())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
