//! Database Schema
//!
//! Table definitions for the runtime's SQLite store: the key-value
//! table backing runtime flags and overrides, the load audit trail,
//! and the virtual file system modules are served from.

/// Current schema version. Bump when adding migrations.
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kv (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT
);

CREATE TABLE IF NOT EXISTS load_audit (
    id          TEXT PRIMARY KEY,
    timestamp   TEXT NOT NULL,
    path        TEXT NOT NULL,
    phase       TEXT NOT NULL,
    critical    INTEGER NOT NULL DEFAULT 0,
    detail      TEXT
);

CREATE INDEX IF NOT EXISTS idx_load_audit_timestamp ON load_audit(timestamp);
CREATE INDEX IF NOT EXISTS idx_load_audit_path ON load_audit(path);

CREATE TABLE IF NOT EXISTS vfs_files (
    path        TEXT PRIMARY KEY,
    content     TEXT NOT NULL,
    updated_at  TEXT
);
"#;
