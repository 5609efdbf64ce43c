//! Live record handles
//!
//! A [`ResourceRef`] pins one identity of one storage and re-resolves it
//! after every successful reload, so holders always see the current record.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use restable_core::{Record, Result, Value};

use crate::storage::Storage;

/// Handle on the current record with a given identity
#[derive(Debug, Clone)]
pub struct ResourceRef {
    id: Value,
    slot: Arc<RwLock<Option<Arc<Record>>>>,
}

impl ResourceRef {
    /// Resolve `id` in `storage` and follow it across reloads
    ///
    /// With `required`, an absent record fails the bind with a not-found
    /// error. A record that disappears in a later reload leaves the handle
    /// empty.
    pub fn bind(storage: &Arc<Storage>, id: impl Into<Value>, required: bool) -> Result<Self> {
        let id = id.into();
        let current = if required {
            Some(storage.get_required(id.clone())?)
        } else {
            storage.get(id.clone())?
        };
        let slot = Arc::new(RwLock::new(current));

        let weak_storage: Weak<Storage> = Arc::downgrade(storage);
        let weak_slot = Arc::downgrade(&slot);
        let observed = id.clone();
        storage.add_observer_while(move || {
            let (Some(storage), Some(slot)) = (weak_storage.upgrade(), weak_slot.upgrade()) else {
                return false;
            };
            match storage.get(observed.clone()) {
                Ok(record) => {
                    if record.is_none() {
                        warn!(
                            target: "restable::storage",
                            resource = ?storage.resource_type(),
                            id = %observed,
                            "Referenced record disappeared after reload"
                        );
                    }
                    *slot.write() = record;
                }
                Err(e) => {
                    warn!(
                        target: "restable::storage",
                        id = %observed,
                        error = %e,
                        "Cannot refresh reference"
                    );
                }
            }
            true
        });

        Ok(ResourceRef { id, slot })
    }

    /// The pinned identity
    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Current record, if present
    pub fn get(&self) -> Option<Arc<Record>> {
        self.slot.read().clone()
    }

    /// Whether the record is currently present
    pub fn is_present(&self) -> bool {
        self.slot.read().is_some()
    }
}
