//! Storage registry
//!
//! The [`StorageManager`] maps each resource type to its definition and its
//! [`Storage`]. Storages are created lazily and exactly once per type:
//!
//! ```rust,ignore
//! let manager = StorageManager::new(StorageContext::default());
//! manager.initialize(ResourceDefinition::new(item_schema, "data/Item.json", "json"))?;
//!
//! let items = manager.get_storage(&ResourceType::new("Item"))?;
//! let sword = items.get_unique("name", &["sword".into()])?;
//!
//! // After the backing file changed on disk
//! manager.on_file_change(Path::new("data/Item.json"))?;
//! ```
//!
//! Definitions are kept across [`StorageManager::clear`]; storages are not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use restable_core::{Error, Record, ResourceType, Result, Value};

use crate::definition::ResourceDefinition;
use crate::reference::ResourceRef;
use crate::storage::{Storage, StorageContext};

/// Registry of resource definitions and their storages
pub struct StorageManager {
    context: StorageContext,
    definitions: DashMap<ResourceType, Arc<ResourceDefinition>>,
    storages: DashMap<ResourceType, Arc<Storage>>,
    /// Backing file path → owning type, for change signals
    resource_map: RwLock<FxHashMap<PathBuf, ResourceType>>,
}

impl StorageManager {
    /// Create an empty registry whose storages share `context`
    pub fn new(context: StorageContext) -> Self {
        StorageManager {
            context,
            definitions: DashMap::new(),
            storages: DashMap::new(),
            resource_map: RwLock::new(FxHashMap::default()),
        }
    }

    /// The shared capabilities
    pub fn context(&self) -> &StorageContext {
        &self.context
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `definition` and eagerly load its storage
    ///
    /// The definition's location is added to the resource map unless the
    /// path is already mapped.
    ///
    /// # Errors
    ///
    /// Configuration error if the type is already registered; any error of
    /// the first load. A definition whose first load failed stays registered,
    /// so a later [`get_storage`](Self::get_storage) retries the load.
    pub fn initialize(&self, definition: ResourceDefinition) -> Result<Arc<Storage>> {
        let ty = definition.resource_type().clone();
        match self.definitions.entry(ty.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::configuration(format!(
                    "duplicate resource definition for {}",
                    ty
                )));
            }
            Entry::Vacant(slot) => {
                self.resource_map
                    .write()
                    .entry(definition.location().to_path_buf())
                    .or_insert_with(|| ty.clone());
                slot.insert(Arc::new(definition));
            }
        }
        debug!(target: "restable::registry", resource = %ty, "Registered definition");
        self.get_storage(&ty)
    }

    /// Registered definition of `ty`
    pub fn definition(&self, ty: &ResourceType) -> Option<Arc<ResourceDefinition>> {
        self.definitions.get(ty).map(|d| Arc::clone(d.value()))
    }

    // ========================================================================
    // Storages
    // ========================================================================

    /// Storage of `ty`, created and loaded on first use
    ///
    /// Concurrent first calls for one type construct a single storage; every
    /// caller waits for its first load and receives the same instance.
    ///
    /// # Errors
    ///
    /// Configuration error ("missing resource definition") if `ty` was never
    /// registered; any error of the first load.
    pub fn get_storage(&self, ty: &ResourceType) -> Result<Arc<Storage>> {
        let definition = self.definition(ty).ok_or_else(|| {
            Error::configuration(format!("missing resource definition for {}", ty))
        })?;

        let storage = self
            .storages
            .entry(ty.clone())
            .or_insert_with(|| Arc::new(Storage::new(self.context.clone())))
            .value()
            .clone();

        storage.initialize(&definition)?;
        Ok(storage)
    }

    /// Reload the storage of `ty`
    ///
    /// A type that is registered but has no loaded storage (never loaded, or
    /// dropped by [`clear`](Self::clear)) is loaded instead.
    pub fn reload(&self, ty: &ResourceType) -> Result<()> {
        let existing = self.storages.get(ty).map(|s| Arc::clone(s.value()));
        match existing {
            Some(storage) if storage.is_initialized() => storage.reload(),
            _ => self.get_storage(ty).map(|_| ()),
        }
    }

    /// Drop every storage; definitions are kept
    pub fn clear(&self) {
        let dropped = self.storages.len();
        self.storages.clear();
        info!(target: "restable::registry", dropped, "Cleared storages");
    }

    /// Types that currently have a storage, sorted
    pub fn list_storages(&self) -> Vec<ResourceType> {
        let mut types: Vec<ResourceType> = self.storages.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    /// Record `id` of type `ty`
    pub fn get_resource(
        &self,
        ty: &ResourceType,
        id: impl Into<Value>,
    ) -> Result<Option<Arc<Record>>> {
        self.get_storage(ty)?.get(id)
    }

    /// Live handle on record `id` of type `ty`
    pub fn bind_ref(
        &self,
        ty: &ResourceType,
        id: impl Into<Value>,
        required: bool,
    ) -> Result<ResourceRef> {
        let storage = self.get_storage(ty)?;
        ResourceRef::bind(&storage, id, required)
    }

    // ========================================================================
    // Change signals
    // ========================================================================

    /// Replace the path → type table
    pub fn set_resource_map<I>(&self, map: I)
    where
        I: IntoIterator<Item = (PathBuf, ResourceType)>,
    {
        *self.resource_map.write() = map.into_iter().collect();
    }

    /// Current path → type table
    pub fn resource_map(&self) -> BTreeMap<PathBuf, ResourceType> {
        self.resource_map
            .read()
            .iter()
            .map(|(path, ty)| (path.clone(), ty.clone()))
            .collect()
    }

    /// Handle a "this file changed" signal
    ///
    /// Returns `Ok(true)` if the path belongs to a resource type and that
    /// type was reloaded, `Ok(false)` for unmapped paths.
    pub fn on_file_change(&self, path: &Path) -> Result<bool> {
        let ty = self.resource_map.read().get(path).cloned();
        let Some(ty) = ty else {
            debug!(target: "restable::registry", path = ?path, "Ignoring change of unmapped file");
            return Ok(false);
        };
        warn!(
            target: "restable::registry",
            resource = %ty,
            path = ?path,
            "Resource file changed, reloading"
        );
        self.reload(&ty)?;
        Ok(true)
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("definitions", &self.definitions.len())
            .field("storages", &self.storages.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restable_core::AttributeKind;
    use restable_index::{AttributeDef, ResourceSchema};
    use tempfile::TempDir;

    fn definition(dir: &TempDir, name: &str, json: &str) -> ResourceDefinition {
        let schema = ResourceSchema::builder(name)
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .attribute(AttributeDef::new("label", AttributeKind::String))
            .build();
        let path = dir.path().join(format!("{}.json", name));
        std::fs::write(&path, json).unwrap();
        ResourceDefinition::new(schema, path, "json")
    }

    #[test]
    fn test_initialize_and_lookup() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::new(StorageContext::default());
        manager
            .initialize(definition(&dir, "Item", r#"[{"id": 1, "label": "a"}]"#))
            .unwrap();

        let ty = ResourceType::new("Item");
        assert_eq!(manager.list_storages(), vec![ty.clone()]);
        let record = manager.get_resource(&ty, 1).unwrap().unwrap();
        assert_eq!(record.get("label"), &Value::from("a"));
        assert!(manager.definition(&ty).is_some());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::new(StorageContext::default());
        manager.initialize(definition(&dir, "Item", "[]")).unwrap();
        let err = manager.initialize(definition(&dir, "Item", "[]")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_missing_definition() {
        let manager = StorageManager::new(StorageContext::default());
        let ty = ResourceType::new("Ghost");
        let err = manager.get_storage(&ty).unwrap_err();
        assert!(err.to_string().contains("missing resource definition"));
        assert!(manager.reload(&ty).unwrap_err().is_configuration());
    }

    #[test]
    fn test_get_storage_returns_same_instance() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::new(StorageContext::default());
        let first = manager.initialize(definition(&dir, "Item", "[]")).unwrap();
        let second = manager.get_storage(&ResourceType::new("Item")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_clear_keeps_definitions() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::new(StorageContext::default());
        let ty = ResourceType::new("Item");
        let before = manager.initialize(definition(&dir, "Item", "[]")).unwrap();

        manager.clear();
        assert!(manager.list_storages().is_empty());

        let after = manager.get_storage(&ty).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.is_initialized());
    }

    #[test]
    fn test_failed_first_load_is_retried() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::new(StorageContext::default());
        let ty = ResourceType::new("Item");
        assert!(manager.initialize(definition(&dir, "Item", "{")).unwrap_err().is_decode());

        std::fs::write(dir.path().join("Item.json"), r#"[{"id": 4}]"#).unwrap();
        manager.reload(&ty).unwrap();
        assert!(manager.get_resource(&ty, 4).unwrap().is_some());
    }

    #[test]
    fn test_on_file_change_routes_to_owner() {
        let dir = TempDir::new().unwrap();
        let manager = StorageManager::new(StorageContext::default());
        let def = definition(&dir, "Item", r#"[{"id": 1}]"#);
        let path = def.location().to_path_buf();
        manager.initialize(def).unwrap();
        assert_eq!(manager.resource_map().get(&path), Some(&ResourceType::new("Item")));

        std::fs::write(&path, r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        assert!(manager.on_file_change(&path).unwrap());
        let storage = manager.get_storage(&ResourceType::new("Item")).unwrap();
        assert_eq!(storage.len().unwrap(), 2);

        assert!(!manager.on_file_change(&dir.path().join("other.json")).unwrap());
    }

    #[test]
    fn test_set_resource_map_replaces() {
        let manager = StorageManager::new(StorageContext::default());
        manager.set_resource_map([(PathBuf::from("/data/a.json"), ResourceType::new("A"))]);
        let map = manager.resource_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(Path::new("/data/a.json")), Some(&ResourceType::new("A")));
    }
}
