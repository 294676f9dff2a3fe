//! Genesis Configuration Files
//!
//! JSON-based configuration for genesis levels and the module
//! registry. Provides defaults for a fresh runtime and supports
//! loading from disk with fallback to those defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::types::GenesisConfig;

use super::registry::ModuleRegistry;

/// Default genesis levels for a fresh runtime.
///
/// Three levels in an inheritance chain:
/// - `minimal` - just the kernel
/// - `standard` - adds the scheduler and storage
/// - `full` - adds the http tool, status widget, and telemetry
pub const DEFAULT_GENESIS_CONFIG: &str = r#"{
  "levels": {
    "minimal": {
      "modules": ["kernel"]
    },
    "standard": {
      "extends": "minimal",
      "modules": ["scheduler", "storage"]
    },
    "full": {
      "extends": "standard",
      "modules": ["http", "status-widget", "telemetry"]
    }
  }
}
"#;

/// Default module registry matching the default genesis levels.
///
/// The kernel and scheduler live under `core/` and are therefore
/// critical; everything else uses the `modules/<id>.mod` convention.
pub const DEFAULT_MODULE_REGISTRY: &str = r#"{
  "modules": {
    "kernel": {
      "path": "core/kernel.mod"
    },
    "scheduler": {
      "path": "core/scheduler.mod",
      "dependencies": ["kernel"]
    },
    "storage": {},
    "http": {
      "dependencies": ["storage"]
    },
    "status-widget": {
      "dependencies": [{ "id": "telemetry", "optional": true }]
    },
    "telemetry": {}
  }
}
"#;

/// Module files seeded into the VFS at init time, one per registry
/// entry.
pub const SEED_MODULES: &[(&str, &str)] = &[
    (
        "core/kernel.mod",
        "---\nid: kernel\nkind: service\ndescription: Core runtime kernel\n---\n\nOwns the module table and dispatches lifecycle events.\n",
    ),
    (
        "core/scheduler.mod",
        "---\nid: scheduler\nkind: service\ndescription: Task scheduler\n---\n\nRuns queued module tasks in dependency order.\n",
    ),
    (
        "modules/storage.mod",
        "---\nid: storage\nkind: service\ndescription: Key-value storage\n---\n\nDurable storage for module state.\n",
    ),
    (
        "modules/http.mod",
        "---\nid: http\nkind: tool\ndescription: Outbound request tool\n---\n\nIssues outbound requests on behalf of other modules.\n",
    ),
    (
        "modules/status-widget.mod",
        "---\nid: status-widget\nkind: widget\ndescription: Runtime status panel\n---\n\nRenders module health and recent load activity.\n",
    ),
    (
        "modules/telemetry.mod",
        "---\nid: telemetry\nkind: service\ndescription: Metrics collection\n---\n\nCollects counters from running modules.\n",
    ),
];

/// Load genesis levels from a JSON file at the given path.
///
/// Falls back to the default configuration if the file does not exist.
pub fn load_genesis_config(path: &Path) -> Result<GenesisConfig> {
    if !path.exists() {
        info!("Genesis config not found at {}, using defaults", path.display());
        return serde_json::from_str(DEFAULT_GENESIS_CONFIG)
            .context("Failed to parse default genesis config");
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read genesis config from {}", path.display()))?;
    let config: GenesisConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse genesis config from {}", path.display()))?;

    debug!(
        "Loaded {} genesis levels from {}",
        config.levels.len(),
        path.display()
    );
    Ok(config)
}

/// Load the module registry from a JSON file at the given path.
///
/// Falls back to the default registry if the file does not exist.
pub fn load_module_registry(path: &Path) -> Result<ModuleRegistry> {
    if !path.exists() {
        info!("Module registry not found at {}, using defaults", path.display());
        return ModuleRegistry::from_json(DEFAULT_MODULE_REGISTRY)
            .context("Failed to parse default module registry");
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read module registry from {}", path.display()))?;
    let registry = ModuleRegistry::from_json(&contents)
        .with_context(|| format!("Failed to parse module registry from {}", path.display()))?;

    debug!(
        "Loaded {} registry entries from {}",
        registry.len(),
        path.display()
    );
    Ok(registry)
}

/// Write the default genesis config to a file.
///
/// Will not overwrite an existing file.
pub fn write_default_genesis_config(path: &Path) -> Result<()> {
    write_default_file(path, DEFAULT_GENESIS_CONFIG, "genesis config")
}

/// Write the default module registry to a file.
///
/// Will not overwrite an existing file.
pub fn write_default_module_registry(path: &Path) -> Result<()> {
    write_default_file(path, DEFAULT_MODULE_REGISTRY, "module registry")
}

fn write_default_file(path: &Path, contents: &str, label: &str) -> Result<()> {
    if path.exists() {
        warn!("{} already exists at {}, not overwriting", label, path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory for {}", path.display()))?;
    }

    fs::write(path, contents)
        .with_context(|| format!("Failed to write default {} to {}", label, path.display()))?;

    info!("Wrote default {} to {}", label, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::levels::resolve_base_modules;
    use crate::modules::format::parse_module_manifest;

    #[test]
    fn test_default_genesis_parses() {
        let config: GenesisConfig = serde_json::from_str(DEFAULT_GENESIS_CONFIG).unwrap();
        assert_eq!(config.levels.len(), 3);
        let full = resolve_base_modules("full", &config).unwrap();
        assert_eq!(
            full,
            vec!["kernel", "scheduler", "storage", "http", "status-widget", "telemetry"]
        );
    }

    #[test]
    fn test_default_registry_covers_genesis_modules() {
        let config: GenesisConfig = serde_json::from_str(DEFAULT_GENESIS_CONFIG).unwrap();
        let registry = ModuleRegistry::from_json(DEFAULT_MODULE_REGISTRY).unwrap();

        for level in config.levels.values() {
            for id in &level.modules {
                assert!(registry.get(id).is_some(), "no registry entry for {id}");
            }
        }
    }

    #[test]
    fn test_seed_modules_match_registry_paths() {
        let registry = ModuleRegistry::from_json(DEFAULT_MODULE_REGISTRY).unwrap();

        for id in registry.ids() {
            let path = registry.module_path(id);
            let seeded = SEED_MODULES.iter().find(|(p, _)| *p == path);
            assert!(seeded.is_some(), "no seed module for {path}");

            let (_, content) = seeded.unwrap();
            let manifest = parse_module_manifest(content, &path);
            assert_eq!(&manifest.id, id);
        }
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let genesis = load_genesis_config(Path::new("/nonexistent/genesis.json")).unwrap();
        assert!(genesis.level("minimal").is_some());

        let registry = load_module_registry(Path::new("/nonexistent/registry.json")).unwrap();
        assert!(!registry.is_empty());
    }
}
