use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::node::SchemaNode;
use crate::validator::{check_fragment, check_name, compile_meta_schema};

/// Generated catalogue of the `pods.v1` API types.
pub const PODS_V1_CATALOGUE: &str = include_str!("../catalogue/pods.v1.json");

const CATALOGUE_SUFFIX: &str = ".openapi.json";

/// Name-keyed registry of OpenAPI definition fragments.
///
/// Fragments may reference each other through `$ref`; the registry stores
/// them as registered and leaves resolution to [`crate::resolve`]. Once
/// populated the registry is only read.
pub struct SchemaRegistry {
    definitions: BTreeMap<String, SchemaNode>,
    meta_schema: Option<Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Result<Self> {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        let meta_schema = if config.check_definitions {
            Some(compile_meta_schema()?)
        } else {
            None
        };

        Ok(Self {
            definitions: BTreeMap::new(),
            meta_schema,
            config,
        })
    }

    /// Registry holding the embedded `pods.v1` catalogue.
    pub fn pods_v1() -> Result<Self> {
        Self::from_catalogue(PODS_V1_CATALOGUE)
    }

    /// Build a registry from one catalogue document.
    pub fn from_catalogue(catalogue_json: &str) -> Result<Self> {
        let mut registry = Self::new()?;
        registry.register_catalogue(catalogue_json)?;
        Ok(registry)
    }

    /// Register a fragment from a JSON string.
    pub fn register(&mut self, name: &str, fragment_json: &str) -> Result<()> {
        let fragment: Value = serde_json::from_str(fragment_json)?;
        self.register_value(name, &fragment)
    }

    /// Register a fragment from a JSON value.
    pub fn register_value(&mut self, name: &str, fragment: &Value) -> Result<()> {
        check_name(name)?;
        if let Some(meta_schema) = &self.meta_schema {
            check_fragment(name, fragment, meta_schema)?;
        }

        let node: SchemaNode =
            serde_json::from_value(fragment.clone()).map_err(|err| {
                SchemaError::InvalidDefinition {
                    name: name.to_string(),
                    message: err.to_string(),
                }
            })?;
        self.insert(name, node)
    }

    /// Register an already parsed fragment.
    pub fn register_node(&mut self, name: &str, node: SchemaNode) -> Result<()> {
        check_name(name)?;
        if let Some(meta_schema) = &self.meta_schema {
            let fragment = serde_json::to_value(&node)?;
            check_fragment(name, &fragment, meta_schema)?;
        }
        self.insert(name, node)
    }

    /// Register every fragment of a `{"definitions": {...}}` document.
    pub fn register_catalogue(&mut self, catalogue_json: &str) -> Result<usize> {
        let catalogue: Value = serde_json::from_str(catalogue_json)?;
        let definitions = catalogue
            .get("definitions")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                SchemaError::LoadFailed("catalogue has no \"definitions\" object".to_string())
            })?;

        for (name, fragment) in definitions {
            self.register_value(name, fragment)?;
        }

        tracing::debug!(count = definitions.len(), "registered catalogue definitions");
        Ok(definitions.len())
    }

    /// Load every `*.openapi.json` catalogue of a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load catalogues from a directory with explicit config.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config)?;
        let mut loaded_catalogue_count = 0usize;

        let mut entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
        // Directory order is platform dependent; duplicate detection must not be.
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !file_name.ends_with(CATALOGUE_SUFFIX) {
                continue;
            }

            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();

            if file_type.is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load catalogue symlink: {file_name}"
                )));
            }
            if !file_type.is_file() {
                continue;
            }

            loaded_catalogue_count = loaded_catalogue_count.saturating_add(1);
            if loaded_catalogue_count > registry.config.max_catalogues_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "catalogue count exceeds configured max ({}): {}",
                    registry.config.max_catalogues_from_directory, loaded_catalogue_count
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                SchemaError::LoadFailed(format!(
                    "failed opening catalogue {}: {err}",
                    entry_path.display()
                ))
            })?;
            let opened_metadata = file
                .metadata()
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

            #[cfg(unix)]
            {
                if !same_file_identity(&path_metadata, &opened_metadata) {
                    return Err(SchemaError::LoadFailed(format!(
                        "catalogue file changed during load: {file_name}"
                    )));
                }
            }

            if opened_metadata.len() > registry.config.max_catalogue_file_size as u64 {
                return Err(SchemaError::LoadFailed(format!(
                    "catalogue file too large ({} bytes): {file_name}",
                    opened_metadata.len()
                )));
            }

            let max_bytes = registry.config.max_catalogue_file_size;
            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    SchemaError::LoadFailed(format!(
                        "failed reading catalogue {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(SchemaError::LoadFailed(format!(
                    "catalogue file too large while reading: {file_name}"
                )));
            }

            registry.register_catalogue(&content)?;
        }

        Ok(registry)
    }

    /// Fragment registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&SchemaNode> {
        self.definitions
            .get(name)
            .ok_or_else(|| SchemaError::UnknownDefinition(name.to_string()))
    }

    /// Check if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn insert(&mut self, name: &str, node: SchemaNode) -> Result<()> {
        if !self.config.allow_overwrite && self.definitions.contains_key(name) {
            return Err(SchemaError::DuplicateDefinition(name.to_string()));
        }
        self.definitions.insert(name.to_string(), node);
        Ok(())
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
