//! Explicit storage-type registry.
//!
//! Applications build one registry at startup, register the backend types
//! they ship, and resolve [`StorageDescription`]s from configuration through
//! it. There is no process-wide table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::DocumentStorage;
use crate::error::{StorageError, StorageResult};
use crate::memory::MemoryStorage;

/// A configured backend: its registered type name plus free-form parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDescription {
    /// Registered type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl StorageDescription {
    /// Describe a backend of type `kind` with no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// A required string parameter.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDescription`] if the parameter is
    /// missing or not a string.
    pub fn str_param(&self, key: &str) -> StorageResult<&str> {
        self.params
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                StorageError::InvalidDescription(format!(
                    "storage type {} needs a string parameter {key:?}",
                    self.kind
                ))
            })
    }
}

/// Builds a backend from its description.
pub type StorageConstructor =
    Box<dyn Fn(&StorageDescription) -> StorageResult<Arc<dyn DocumentStorage>> + Send + Sync>;

/// Maps type names to constructors.
#[derive(Default)]
pub struct StorageRegistry {
    constructors: HashMap<String, StorageConstructor>,
}

impl StorageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the backends this crate ships (`memory`).
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("memory", |_| {
            Ok(Arc::new(MemoryStorage::new()) as Arc<dyn DocumentStorage>)
        });
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&StorageDescription) -> StorageResult<Arc<dyn DocumentStorage>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
        self
    }

    /// Whether `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered type names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build the backend described by `description`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownType`] for an unregistered type, or
    /// whatever the constructor reports.
    pub fn create(&self, description: &StorageDescription) -> StorageResult<Arc<dyn DocumentStorage>> {
        let constructor = self
            .constructors
            .get(&description.kind)
            .ok_or_else(|| StorageError::UnknownType(description.kind.clone()))?;
        constructor(description)
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capabilities, Capacity};

    #[test]
    fn builtin_memory_type() {
        let registry = StorageRegistry::with_builtin();
        assert!(registry.contains("memory"));
        let store = registry.create(&StorageDescription::new("memory")).unwrap();
        assert!(store.has_capacity(Capacity::List));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = StorageRegistry::new();
        assert!(matches!(
            registry.create(&StorageDescription::new("nope")),
            Err(StorageError::UnknownType(kind)) if kind == "nope"
        ));
    }

    #[test]
    fn custom_constructors_see_parameters() {
        let mut registry = StorageRegistry::new();
        registry.register("limited", |description| {
            let mode = description.str_param("mode")?;
            let caps = if mode == "bare" {
                Capabilities::none()
            } else {
                Capabilities::all()
            };
            Ok(Arc::new(MemoryStorage::with_capabilities(caps)) as Arc<dyn DocumentStorage>)
        });

        let bare = registry
            .create(&StorageDescription::new("limited").with_param("mode", "bare"))
            .unwrap();
        assert!(!bare.has_capacity(Capacity::List));
        assert!(matches!(
            registry.create(&StorageDescription::new("limited")),
            Err(StorageError::InvalidDescription(_))
        ));
        assert_eq!(registry.kinds(), vec!["limited"]);
    }

    #[test]
    fn description_from_json() {
        let description: StorageDescription =
            serde_json::from_str(r#"{"type": "snapshot", "path": "local.json"}"#).unwrap();
        assert_eq!(description.kind, "snapshot");
        assert_eq!(description.str_param("path").unwrap(), "local.json");
    }
}
