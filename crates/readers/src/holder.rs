//! Format name → reader lookup

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use restable_core::{Error, Result};

use crate::json::JsonReader;
use crate::sheet::SheetReader;
use crate::ResourceReader;

/// Holds every available reader, keyed by format name
///
/// `new()` registers the built-in `json` and `sheet` readers. Registering a
/// reader under an existing format replaces the previous one.
pub struct ReaderHolder {
    readers: RwLock<FxHashMap<String, Arc<dyn ResourceReader>>>,
}

impl ReaderHolder {
    /// Holder with the built-in readers
    pub fn new() -> Self {
        let holder = Self::empty();
        holder.register(Arc::new(JsonReader::new()));
        holder.register(Arc::new(SheetReader::new()));
        holder
    }

    /// Holder without any reader
    pub fn empty() -> Self {
        ReaderHolder {
            readers: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register `reader` under its format name, returning the one it replaced
    pub fn register(&self, reader: Arc<dyn ResourceReader>) -> Option<Arc<dyn ResourceReader>> {
        let format = reader.format().to_string();
        debug!(target: "restable::reader", format = %format, "Registered reader");
        self.readers.write().insert(format, reader)
    }

    /// Reader for `format`
    ///
    /// # Errors
    ///
    /// Configuration error if no reader is registered under `format`.
    pub fn get(&self, format: &str) -> Result<Arc<dyn ResourceReader>> {
        self.readers
            .read()
            .get(format)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("no reader for format '{}'", format)))
    }

    /// Registered format names, sorted
    pub fn formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.readers.read().keys().cloned().collect();
        formats.sort();
        formats
    }
}

impl Default for ReaderHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReaderHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderHolder")
            .field("formats", &self.formats())
            .finish()
    }
}
