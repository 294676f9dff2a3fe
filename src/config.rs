//! Runtime Configuration
//!
//! Loads and saves the runtime configuration from `~/.protean/runtime.json`,
//! plus typed accessors for the operator-tunable knobs kept in the kv
//! table: the sandbox gating flag, the approval mode, and the module
//! override map. Each loader distinguishes an absent value (which gets
//! a default) from a present-but-invalid one (which is an error).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;

use crate::genesis::overrides::{parse_override_map, serialize_module_overrides};
use crate::state::Database;
use crate::types::{default_config, ApprovalMode, NormalizedOverrides, RuntimeConfig};

/// Runtime directory name under the user's home.
const RUNTIME_DIR_NAME: &str = ".protean";

/// Config file name within the runtime directory.
const CONFIG_FILENAME: &str = "runtime.json";

/// kv key for the sandbox gating flag.
pub const KV_SANDBOX_GATING: &str = "sandbox_gating";

/// kv key for the approval mode.
pub const KV_APPROVAL_MODE: &str = "approval_mode";

/// kv key for the module override map.
pub const KV_MODULE_OVERRIDES: &str = "module_overrides";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {path}")]
    Missing { path: String },

    #[error("failed to read {path}")]
    Unreadable {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("failed to store {key}")]
    Store {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Returns the runtime base directory: `~/.protean`.
pub fn get_runtime_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
    home.join(RUNTIME_DIR_NAME)
}

/// Returns the full path to the config file: `~/.protean/runtime.json`.
pub fn get_config_path() -> PathBuf {
    get_runtime_dir().join(CONFIG_FILENAME)
}

/// Load the runtime config from disk.
///
/// Reads `~/.protean/runtime.json` and merges missing fields with
/// defaults. A missing file and a malformed file are distinct errors
/// so callers can offer `--init` for the former.
pub fn load_config() -> Result<RuntimeConfig, ConfigError> {
    let config_path = get_config_path();
    let path_str = config_path.to_string_lossy().to_string();

    if !config_path.exists() {
        return Err(ConfigError::Missing { path: path_str });
    }

    let contents = fs::read_to_string(&config_path).map_err(|e| ConfigError::Unreadable {
        path: path_str.clone(),
        source: e.into(),
    })?;
    let mut config: RuntimeConfig =
        serde_json::from_str(&contents).map_err(|e| ConfigError::Unreadable {
            path: path_str,
            source: e.into(),
        })?;

    // Merge defaults for unset fields
    let defaults = default_config();

    if config.name.is_empty() {
        config.name = defaults.name;
    }
    if config.db_path.is_empty() {
        config.db_path = defaults.db_path;
    }
    if config.genesis_path.is_empty() {
        config.genesis_path = defaults.genesis_path;
    }
    if config.registry_path.is_empty() {
        config.registry_path = defaults.registry_path;
    }
    if config.critical_prefixes.is_empty() {
        config.critical_prefixes = defaults.critical_prefixes;
    }
    if config.approval_timeout_ms == 0 {
        config.approval_timeout_ms = defaults.approval_timeout_ms;
    }
    if config.version.is_empty() {
        config.version = defaults.version;
    }

    Ok(config)
}

/// Save the runtime config to disk at `~/.protean/runtime.json`.
///
/// Creates the runtime directory with mode 0o700 if it does not exist.
/// The config file is written with mode 0o600.
pub fn save_config(config: &RuntimeConfig) -> Result<()> {
    let dir = get_runtime_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create runtime directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }

    let config_path = get_config_path();
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&config_path, &json).context("Failed to write config file")?;
    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
///
/// If the path starts with `~`, the tilde is replaced with the user's
/// home directory. Otherwise the path is returned as-is.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

// ---------------------------------------------------------------------------
// kv-backed knobs
// ---------------------------------------------------------------------------

/// Load the sandbox gating flag. Absent means enabled.
pub fn load_gating_flag(db: &Database) -> Result<bool, ConfigError> {
    match kv_get(db, KV_SANDBOX_GATING)? {
        None => Ok(true),
        Some(value) => match value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: KV_SANDBOX_GATING.to_string(),
                value,
            }),
        },
    }
}

pub fn save_gating_flag(db: &Database, enabled: bool) -> Result<(), ConfigError> {
    kv_set(db, KV_SANDBOX_GATING, if enabled { "true" } else { "false" })
}

/// Load the approval mode. Absent means supervised.
pub fn load_approval_mode(db: &Database) -> Result<ApprovalMode, ConfigError> {
    match kv_get(db, KV_APPROVAL_MODE)? {
        None => Ok(ApprovalMode::Supervised),
        Some(value) => serde_json::from_str(&format!("\"{}\"", value)).map_err(|_| {
            ConfigError::Invalid {
                key: KV_APPROVAL_MODE.to_string(),
                value,
            }
        }),
    }
}

pub fn save_approval_mode(db: &Database, mode: ApprovalMode) -> Result<(), ConfigError> {
    kv_set(db, KV_APPROVAL_MODE, mode.as_str())
}

/// Load the stored module override map. Absent or unparseable storage
/// yields the empty map; junk entries inside are dropped the usual way.
pub fn load_module_overrides(db: &Database) -> Result<NormalizedOverrides, ConfigError> {
    match kv_get(db, KV_MODULE_OVERRIDES)? {
        None => Ok(NormalizedOverrides::default()),
        Some(stored) => Ok(parse_override_map(&stored)),
    }
}

/// Persist an override map in canonical (normalized, key-sorted) form.
pub fn save_module_overrides(db: &Database, raw: &Value) -> Result<(), ConfigError> {
    kv_set(db, KV_MODULE_OVERRIDES, &serialize_module_overrides(raw))
}

fn kv_get(db: &Database, key: &str) -> Result<Option<String>, ConfigError> {
    db.get_kv(key).map_err(|e| ConfigError::Unreadable {
        path: format!("kv:{}", key),
        source: e,
    })
}

fn kv_set(db: &Database, key: &str, value: &str) -> Result<(), ConfigError> {
    db.set_kv(key, value).map_err(|e| ConfigError::Store {
        key: key.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OverrideState;

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }

    #[test]
    fn test_gating_flag_defaults_to_enabled() {
        let db = Database::open_in_memory().unwrap();
        assert!(load_gating_flag(&db).unwrap());
    }

    #[test]
    fn test_gating_flag_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        save_gating_flag(&db, false).unwrap();
        assert!(!load_gating_flag(&db).unwrap());
        save_gating_flag(&db, true).unwrap();
        assert!(load_gating_flag(&db).unwrap());
    }

    #[test]
    fn test_gating_flag_rejects_junk() {
        let db = Database::open_in_memory().unwrap();
        db.set_kv(KV_SANDBOX_GATING, "maybe").unwrap();
        let err = load_gating_flag(&db).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_approval_mode_defaults_to_supervised() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(load_approval_mode(&db).unwrap(), ApprovalMode::Supervised);
    }

    #[test]
    fn test_approval_mode_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        save_approval_mode(&db, ApprovalMode::Autonomous).unwrap();
        assert_eq!(load_approval_mode(&db).unwrap(), ApprovalMode::Autonomous);
    }

    #[test]
    fn test_approval_mode_rejects_junk() {
        let db = Database::open_in_memory().unwrap();
        db.set_kv(KV_APPROVAL_MODE, "yolo").unwrap();
        assert!(load_approval_mode(&db).is_err());
    }

    #[test]
    fn test_module_overrides_roundtrip_canonical() {
        let db = Database::open_in_memory().unwrap();
        let raw = serde_json::json!({
            "zeta": "off",
            "alpha": "on",
            "junk": "sideways",
        });
        save_module_overrides(&db, &raw).unwrap();

        let stored = db.get_kv(KV_MODULE_OVERRIDES).unwrap().unwrap();
        assert_eq!(stored, r#"{"alpha":"on","zeta":"off"}"#);

        let loaded = load_module_overrides(&db).unwrap();
        assert_eq!(loaded.overrides.get("alpha"), Some(&OverrideState::On));
        assert_eq!(loaded.overrides.get("zeta"), Some(&OverrideState::Off));
        assert!(!loaded.overrides.contains_key("junk"));
    }

    #[test]
    fn test_module_overrides_default_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(load_module_overrides(&db).unwrap().is_empty());
    }
}
