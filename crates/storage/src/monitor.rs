//! Backing file monitor
//!
//! [`FileMonitor`] runs in a background thread and polls the modification
//! time of every path in the registry's resource map. A changed path is
//! handed to [`StorageManager::on_file_change`].
//!
//! - The first sighting of a path only records its modification time
//! - A path that disappears is remembered as missing; reappearing counts as a change
//! - Reload failures are logged and never stop the thread

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, error};

use restable_core::{Error, Result};

use crate::registry::StorageManager;

/// Background poller of backing files
///
/// # Example
///
/// ```ignore
/// let manager = Arc::new(StorageManager::new(StorageContext::default()));
/// let monitor = FileMonitor::new(Arc::clone(&manager), Duration::from_secs(3));
/// let handle = monitor.start()?;
///
/// // ... serve lookups ...
///
/// monitor.shutdown();
/// handle.join().unwrap();
/// ```
pub struct FileMonitor {
    manager: Arc<StorageManager>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    /// Last seen modification time; `None` while the file is missing
    seen: Arc<Mutex<FxHashMap<PathBuf, Option<SystemTime>>>>,
}

impl FileMonitor {
    /// Create a monitor over `manager`'s resource map
    ///
    /// Current modification times are recorded immediately, so files that
    /// do not change afterwards never trigger a reload.
    pub fn new(manager: Arc<StorageManager>, interval: Duration) -> Self {
        let monitor = FileMonitor {
            manager,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            seen: Arc::new(Mutex::new(FxHashMap::default())),
        };
        monitor.poll_once();
        monitor
    }

    /// Poll interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the background polling thread
    ///
    /// The thread runs until [`shutdown`](Self::shutdown) is called. A zero
    /// interval is a configuration error; use [`poll_once`](Self::poll_once)
    /// to scan on demand instead.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        if self.interval.is_zero() {
            return Err(Error::configuration("file monitor interval must be non-zero"));
        }
        let manager = Arc::clone(&self.manager);
        let shutdown = Arc::clone(&self.shutdown);
        let seen = Arc::clone(&self.seen);
        let interval = self.interval;

        thread::Builder::new()
            .name("restable-monitor".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    // Short sleep slices keep shutdown responsive
                    let slice = Duration::from_millis(100).min(interval);
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(slice);
                        elapsed += slice;
                    }
                    scan(&manager, &seen);
                }
            })
            .map_err(|e| Error::configuration(format!("failed to spawn file monitor: {}", e)))
    }

    /// Run one scan synchronously, returning the paths that changed
    pub fn poll_once(&self) -> Vec<PathBuf> {
        scan(&self.manager, &self.seen)
    }

    /// Signal the background thread to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown was signalled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn scan(
    manager: &StorageManager,
    seen: &Mutex<FxHashMap<PathBuf, Option<SystemTime>>>,
) -> Vec<PathBuf> {
    let mut changed = Vec::new();
    {
        let mut seen = seen.lock();
        for path in manager.resource_map().into_keys() {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
            match seen.insert(path.clone(), modified) {
                Some(previous) if previous != modified => {
                    if modified.is_some() {
                        changed.push(path);
                    } else {
                        debug!(
                            target: "restable::monitor",
                            path = ?path,
                            "Resource file disappeared"
                        );
                    }
                }
                _ => {}
            }
        }
    }

    for path in &changed {
        if let Err(e) = manager.on_file_change(path) {
            error!(
                target: "restable::monitor",
                path = ?path,
                error = %e,
                "Reload after file change failed"
            );
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ResourceDefinition;
    use crate::storage::StorageContext;
    use restable_core::{AttributeKind, ResourceType};
    use restable_index::{AttributeDef, ResourceSchema};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<StorageManager>, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Item.json");
        std::fs::write(&path, r#"[{"id": 1}]"#).unwrap();
        let schema = ResourceSchema::builder("Item")
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .build();
        let manager = Arc::new(StorageManager::new(StorageContext::default()));
        manager
            .initialize(ResourceDefinition::new(schema, path.clone(), "json"))
            .unwrap();
        (dir, manager, path)
    }

    fn rewrite(path: &PathBuf, json: &str) {
        // Step past coarse filesystem timestamp granularity
        thread::sleep(Duration::from_millis(1100));
        std::fs::write(path, json).unwrap();
    }

    #[test]
    fn test_monitor_creation_and_shutdown() {
        let (_dir, manager, _path) = setup();
        let monitor = FileMonitor::new(manager, Duration::from_secs(3));
        assert_eq!(monitor.interval(), Duration::from_secs(3));
        assert!(!monitor.is_shutdown());
        monitor.shutdown();
        assert!(monitor.is_shutdown());
    }

    #[test]
    fn test_zero_interval_refuses_to_start() {
        let (_dir, manager, path) = setup();
        let monitor = FileMonitor::new(manager, Duration::ZERO);
        assert!(monitor.start().unwrap_err().is_configuration());

        rewrite(&path, r#"[{"id": 1}, {"id": 2}]"#);
        assert_eq!(monitor.poll_once(), vec![path]);
    }

    #[test]
    fn test_unchanged_files_are_not_reloaded() {
        let (_dir, manager, _path) = setup();
        let monitor = FileMonitor::new(manager, Duration::from_secs(3));
        assert!(monitor.poll_once().is_empty());
    }

    #[test]
    fn test_changed_file_is_reloaded() {
        let (_dir, manager, path) = setup();
        let monitor = FileMonitor::new(Arc::clone(&manager), Duration::from_secs(3));

        rewrite(&path, r#"[{"id": 1}, {"id": 2}]"#);
        assert_eq!(monitor.poll_once(), vec![path]);

        let storage = manager.get_storage(&ResourceType::new("Item")).unwrap();
        assert_eq!(storage.len().unwrap(), 2);
        assert!(monitor.poll_once().is_empty());
    }

    #[test]
    fn test_failed_reload_keeps_data_and_monitor() {
        let (_dir, manager, path) = setup();
        let monitor = FileMonitor::new(Arc::clone(&manager), Duration::from_secs(3));

        rewrite(&path, "broken");
        assert_eq!(monitor.poll_once().len(), 1);
        let storage = manager.get_storage(&ResourceType::new("Item")).unwrap();
        assert_eq!(storage.len().unwrap(), 1);
    }

    #[test]
    fn test_background_thread_picks_up_change() {
        let (_dir, manager, path) = setup();
        let monitor = FileMonitor::new(Arc::clone(&manager), Duration::from_millis(50));
        let handle = monitor.start().unwrap();

        rewrite(&path, r#"[{"id": 1}, {"id": 2}, {"id": 3}]"#);
        let storage = manager.get_storage(&ResourceType::new("Item")).unwrap();
        let mut loaded = 0;
        for _ in 0..100 {
            loaded = storage.len().unwrap();
            if loaded == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(loaded, 3);

        monitor.shutdown();
        handle.join().unwrap();
    }
}
