//! Storage layer for restable
//!
//! This crate implements the indexed resource storage engine with:
//! - ResourceDefinition: immutable description of one resource type
//! - Storage: per-type container with primary and secondary indexes
//! - StorageManager: registry creating each storage exactly once
//! - ResourceRef: record handle that follows reloads
//! - FileMonitor: background poller turning file changes into reloads
//! - LoaderConfig: TOML configuration of locations and formats
//!
//! # Reloads
//!
//! A reload builds a complete new generation off to the side and publishes
//! it in one swap. Readers never observe a partially loaded storage, and a
//! failed reload leaves the previous generation in place.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod definition;
pub mod monitor;
pub mod reference;
pub mod registry;
pub mod storage;

pub use config::{LoaderConfig, ResourceOverride, CONFIG_FILE_NAME};
pub use definition::{InjectDefinition, InjectScope, ResourceDefinition};
pub use monitor::FileMonitor;
pub use reference::ResourceRef;
pub use registry::StorageManager;
pub use storage::{Observer, Storage, StorageContext};
