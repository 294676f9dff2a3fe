//! Module Registry
//!
//! The registry maps module ids to their dependency lists and VFS
//! paths. Registry files come in two shapes in the wild: a bare
//! `{ id: entry }` object, or the same map nested under a top-level
//! `modules` key. Both parse to the same `ModuleRegistry`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::types::{ModuleDependency, ModuleRegistryEntry};

/// Default VFS location for a module without an explicit `path`.
pub fn conventional_module_path(module_id: &str) -> String {
    format!("modules/{}.mod", module_id)
}

#[derive(Clone, Debug, Default)]
pub struct ModuleRegistry {
    entries: BTreeMap<String, ModuleRegistryEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, entry: ModuleRegistryEntry) {
        self.entries.insert(id.to_string(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&ModuleRegistryEntry> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dependencies of `id`. A module absent from the registry has no
    /// declared dependencies.
    pub fn dependencies(&self, id: &str) -> &[ModuleDependency] {
        self.entries
            .get(id)
            .map(|entry| entry.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// The VFS path for `id`: the entry's explicit `path` if present,
    /// otherwise the `modules/<id>.mod` convention.
    pub fn module_path(&self, id: &str) -> String {
        self.entries
            .get(id)
            .and_then(|entry| entry.path.clone())
            .unwrap_or_else(|| conventional_module_path(id))
    }

    /// Parse a registry from a JSON value, accepting both the bare map
    /// shape and the `{ "modules": { ... } }` wrapper. When a top-level
    /// `modules` key holds an object, the nested shape wins.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .context("module registry must be a JSON object")?;
        let map = match object.get("modules").and_then(|m| m.as_object()) {
            Some(nested) => nested,
            None => object,
        };

        let mut entries: BTreeMap<String, ModuleRegistryEntry> = BTreeMap::new();
        for (id, raw) in map {
            let entry: ModuleRegistryEntry = serde_json::from_value(raw.clone())
                .with_context(|| format!("invalid registry entry for module '{}'", id))?;
            entries.insert(id.clone(), entry);
        }
        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).context("module registry is not valid JSON")?;
        Self::from_value(&value)
    }
}
