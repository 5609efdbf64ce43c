//! Loader configuration via `restable.toml`
//!
//! Says where backing files live, which reader decodes them, and whether
//! records are validated. Per-type overrides pin a file or a format.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use restable_core::{Error, ResourceType, Result};
use restable_index::ResourceSchema;
use restable_readers::SheetReader;

use crate::definition::ResourceDefinition;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "restable.toml";

/// Per-type override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceOverride {
    /// Resource type name
    pub name: String,
    /// Backing file, relative to `location` unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Reader format for this type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Loader configuration loaded from `restable.toml`
///
/// # Example
///
/// ```toml
/// location = "resources"
/// format = "sheet"
/// suffix = "txt"
/// validate = true
/// poll_interval_ms = 3000
///
/// [[resources]]
/// name = "Item"
/// file = "items/all_items.json"
/// format = "json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Directory holding backing files
    #[serde(default = "default_location")]
    pub location: PathBuf,
    /// Default reader format
    #[serde(default = "default_format")]
    pub format: String,
    /// File suffix used for discovery
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Run the validator on every record
    #[serde(default = "default_validate")]
    pub validate: bool,
    /// File monitor tick in milliseconds; 0 disables watching
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-type overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceOverride>,
}

fn default_location() -> PathBuf {
    PathBuf::from(".")
}

fn default_format() -> String {
    "json".to_string()
}

fn default_suffix() -> String {
    "json".to_string()
}

fn default_validate() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    3000
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            format: default_format(),
            suffix: default_suffix(),
            validate: default_validate(),
            poll_interval_ms: default_poll_interval_ms(),
            resources: Vec::new(),
        }
    }
}

impl LoaderConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# restable loader configuration
#
# Directory holding the backing resource files
location = "."

# Default reader format: "json" or "sheet"
format = "json"

# Suffix of backing files, used to discover them under `location`
suffix = "json"

# Run the record validator on every reload (default: true)
validate = true

# File monitor tick in milliseconds; 0 disables watching
poll_interval_ms = 3000

# Per-type overrides
# [[resources]]
# name = "Item"
# file = "items/all_items.json"
# format = "json"
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse loader config: {}", e)))
    }

    /// Read and parse config from a file path.
    ///
    /// A relative `location` is resolved against the config file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config: LoaderConfig = toml::from_str(&content).map_err(|e| {
            Error::configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        if config.location.is_relative() {
            if let Some(parent) = path.parent() {
                config.location = parent.join(&config.location);
            }
        }
        Ok(config)
    }

    /// Monitor tick, or `None` when watching is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    fn override_for(&self, resource: &str) -> Option<&ResourceOverride> {
        self.resources.iter().find(|r| r.name == resource)
    }

    /// Reader format of `resource`
    pub fn format_for(&self, resource: &str) -> &str {
        self.override_for(resource)
            .and_then(|r| r.format.as_deref())
            .unwrap_or(&self.format)
    }

    /// Backing file of `resource`
    ///
    /// Explicit override first, then a discovered file, then
    /// `<location>/<resource>.<suffix>`.
    pub fn location_for(&self, resource: &str) -> Result<PathBuf> {
        let discovered = self.discover()?;
        Ok(self.resolve(resource, &discovered))
    }

    fn resolve(&self, resource: &str, discovered: &BTreeMap<String, PathBuf>) -> PathBuf {
        if let Some(file) = self.override_for(resource).and_then(|r| r.file.as_ref()) {
            return self.location.join(file);
        }
        if let Some(path) = discovered.get(resource) {
            return path.clone();
        }
        self.location.join(format!("{}.{}", resource, self.suffix))
    }

    /// Map resource names to backing files found under `location`
    ///
    /// Walks `location` recursively for files ending in `suffix`. With the
    /// `sheet` format every sheet title of a file names a resource; otherwise
    /// the file stem does. When two files provide the same name the first
    /// one (in path order) wins.
    pub fn discover(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = if self.location.is_dir() {
            collect_files(&self.location, &self.suffix)?
        } else {
            Vec::new()
        };
        files.sort();

        let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();
        for file in files {
            let names = if self.format == "sheet" {
                let input = fs::File::open(&file).map_err(|e| {
                    Error::decode("", file.display().to_string(), e.to_string())
                })?;
                SheetReader::new().sheet_titles(input)?
            } else {
                file.file_stem()
                    .map(|s| vec![s.to_string_lossy().into_owned()])
                    .unwrap_or_default()
            };
            for name in names {
                if let Some(existing) = found.get(&name) {
                    warn!(
                        target: "restable::storage",
                        resource = %name,
                        kept = ?existing,
                        ignored = ?file,
                        "Resource provided by two files"
                    );
                    continue;
                }
                found.insert(name, file.clone());
            }
        }
        debug!(
            target: "restable::storage",
            location = ?self.location,
            resources = found.len(),
            "Discovered resource files"
        );
        Ok(found)
    }

    /// Definition of `schema`'s resource type under this config
    pub fn definition(&self, schema: ResourceSchema) -> Result<ResourceDefinition> {
        let discovered = self.discover()?;
        Ok(self.define(schema, &discovered))
    }

    /// Definitions of several schemas, discovering files once
    pub fn definitions<I>(&self, schemas: I) -> Result<Vec<ResourceDefinition>>
    where
        I: IntoIterator<Item = ResourceSchema>,
    {
        let discovered = self.discover()?;
        Ok(schemas
            .into_iter()
            .map(|schema| self.define(schema, &discovered))
            .collect())
    }

    fn define(
        &self,
        schema: ResourceSchema,
        discovered: &BTreeMap<String, PathBuf>,
    ) -> ResourceDefinition {
        let name = schema.resource_type().name().to_string();
        let location = self.resolve(&name, discovered);
        let format = self.format_for(&name).to_string();
        ResourceDefinition::new(schema, location, format).validate(self.validate)
    }

    /// Absolute backing path → resource type table for change signals
    pub fn resource_map(definitions: &[ResourceDefinition]) -> BTreeMap<PathBuf, ResourceType> {
        definitions
            .iter()
            .map(|d| {
                let path = fs::canonicalize(d.location())
                    .unwrap_or_else(|_| d.location().to_path_buf());
                (path, d.resource_type().clone())
            })
            .collect()
    }
}

fn collect_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(dir).display().to_string();
            Error::decode("", at, e.to_string())
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().map_or(false, |ext| ext == suffix)
        {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use restable_core::AttributeKind;
    use restable_index::AttributeDef;
    use tempfile::TempDir;

    fn schema(name: &str) -> ResourceSchema {
        ResourceSchema::builder(name)
            .attribute(AttributeDef::new("id", AttributeKind::Int).identity())
            .build()
    }

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.format, "json");
        assert!(config.validate);
        assert_eq!(config.poll_interval(), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_default_toml_parses_to_default() {
        let parsed = LoaderConfig::from_toml_str(LoaderConfig::default_toml()).unwrap();
        assert_eq!(parsed, LoaderConfig::default());
    }

    #[test]
    fn test_parse_overrides() {
        let config = LoaderConfig::from_toml_str(
            r#"
            location = "res"
            format = "sheet"
            suffix = "txt"
            poll_interval_ms = 0

            [[resources]]
            name = "Item"
            file = "items/all.json"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval(), None);
        assert_eq!(config.format_for("Item"), "json");
        assert_eq!(config.format_for("Shop"), "sheet");
        assert_eq!(config.location_for("Item").unwrap(), PathBuf::from("res/items/all.json"));
        assert_eq!(config.location_for("Shop").unwrap(), PathBuf::from("res/Shop.txt"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = LoaderConfig::from_toml_str("validate = \"maybe\"").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_file_resolves_location() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "location = \"data\"\n").unwrap();
        let config = LoaderConfig::from_file(&path).unwrap();
        assert_eq!(config.location, dir.path().join("data"));

        assert!(LoaderConfig::from_file(&dir.path().join("missing.toml"))
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_discover_json_by_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("Item.json"), "[]").unwrap();
        std::fs::write(dir.path().join("nested/Shop.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let config = LoaderConfig {
            location: dir.path().to_path_buf(),
            ..LoaderConfig::default()
        };
        let found = config.discover().unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["Shop"], dir.path().join("nested/Shop.json"));

        let definition = config.definition(schema("Shop")).unwrap();
        assert_eq!(definition.location(), dir.path().join("nested/Shop.json"));
        assert_eq!(definition.format(), "json");
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_skips_symlinked_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Item.json"), "[]").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let files = collect_files(dir.path(), "json").unwrap();
        assert_eq!(files, vec![dir.path().join("Item.json")]);

        let config = LoaderConfig {
            location: dir.path().to_path_buf(),
            ..LoaderConfig::default()
        };
        let found = config.discover().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["Item"], dir.path().join("Item.json"));
    }

    #[test]
    fn test_discover_sheet_titles_first_file_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.txt"),
            "Item\nSERVER\tid\nEND\t1\n\nShop\nSERVER\tid\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("b.txt"), "Shop\nSERVER\tid\n").unwrap();

        let config = LoaderConfig {
            location: dir.path().to_path_buf(),
            format: "sheet".into(),
            suffix: "txt".into(),
            ..LoaderConfig::default()
        };
        let found = config.discover().unwrap();
        assert_eq!(found["Item"], dir.path().join("a.txt"));
        assert_eq!(found["Shop"], dir.path().join("a.txt"));
    }

    #[test]
    fn test_definitions_and_resource_map() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Item.json"), "[]").unwrap();
        let config = LoaderConfig {
            location: dir.path().to_path_buf(),
            validate: false,
            ..LoaderConfig::default()
        };
        let definitions = config.definitions([schema("Item")]).unwrap();
        assert!(!definitions[0].validates());

        let map = LoaderConfig::resource_map(&definitions);
        let canonical = std::fs::canonicalize(dir.path().join("Item.json")).unwrap();
        assert_eq!(map.get(&canonical), Some(&ResourceType::new("Item")));
    }
}
