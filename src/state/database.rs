//! Runtime Database
//!
//! SQLite-backed persistent state for the runtime.
//! Uses rusqlite for synchronous, single-process access.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{LoadAuditEntry, LoadPhase};

use super::schema::{CREATE_TABLES, SCHEMA_VERSION};

/// The runtime's SQLite database handle.
///
/// All persistent state is stored here: runtime flags and overrides in
/// the key-value table, the module-load audit trail, and the virtual
/// file system modules are read from.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `db_path` and return the handle.
    pub fn open(db_path: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create db directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database: {db_path}"))?;

        // Enable WAL mode for better concurrent read performance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute_batch(CREATE_TABLES)
            .context("failed to create tables")?;

        let current_version: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                params![SCHEMA_VERSION],
            )
            .context("failed to update schema version")?;
        }

        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create tables")?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self { conn })
    }

    // ─── Key-Value Store ─────────────────────────────────────────

    pub fn get_kv(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(result)
    }

    pub fn set_kv(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_kv(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ─── Load Audit ──────────────────────────────────────────────

    pub fn insert_load_audit(&self, entry: &LoadAuditEntry) -> Result<()> {
        let phase_str = serde_json::to_string(&entry.phase)?;
        let phase_str = phase_str.trim_matches('"');
        self.conn.execute(
            "INSERT INTO load_audit (id, timestamp, path, phase, critical, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.timestamp,
                entry.path,
                phase_str,
                entry.critical as i32,
                entry.detail,
            ],
        )?;
        Ok(())
    }

    pub fn get_recent_load_audit(&self, limit: i64) -> Result<Vec<LoadAuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, path, phase, critical, detail
             FROM load_audit ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let mut entries: Vec<LoadAuditEntry> = stmt
            .query_map(params![limit], |row| Ok(Self::deserialize_load_entry(row)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    pub fn get_load_audit_for_path(&self, path: &str, limit: i64) -> Result<Vec<LoadAuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, path, phase, critical, detail
             FROM load_audit WHERE path = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let mut entries: Vec<LoadAuditEntry> = stmt
            .query_map(params![path, limit], |row| {
                Ok(Self::deserialize_load_entry(row))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Count of audit entries grouped by phase, phase name ascending.
    pub fn count_load_audit_by_phase(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT phase, COUNT(*) FROM load_audit GROUP BY phase ORDER BY phase ASC",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ─── VFS Files ───────────────────────────────────────────────

    pub fn vfs_read(&self, path: &str) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row(
                "SELECT content FROM vfs_files WHERE path = ?1",
                params![path],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn vfs_exists(&self, path: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM vfs_files WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn vfs_write(&self, path: &str, content: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO vfs_files (path, content, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![path, content],
        )?;
        Ok(())
    }

    pub fn vfs_delete(&self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM vfs_files WHERE path = ?1", params![path])?;
        Ok(())
    }

    pub fn vfs_list(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM vfs_files ORDER BY path ASC")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Every file in the VFS, path ascending. Used for snapshots.
    pub fn vfs_all(&self) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, content FROM vfs_files ORDER BY path ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    }

    /// Replace the entire VFS with `files` in a single transaction.
    /// Used to restore a snapshot.
    pub fn vfs_replace_all(&mut self, files: &BTreeMap<String, String>) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM vfs_files", [])?;
        for (path, content) in files {
            tx.execute(
                "INSERT INTO vfs_files (path, content, updated_at) VALUES (?1, ?2, datetime('now'))",
                params![path, content],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ─── Close ───────────────────────────────────────────────────

    /// Explicitly close the database connection.
    /// This is also handled automatically when the `Database` is dropped,
    /// but calling this method allows you to handle any close errors.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow::anyhow!("failed to close database: {e}"))?;
        Ok(())
    }

    // ─── Deserializers (private) ─────────────────────────────────

    fn deserialize_load_entry(row: &rusqlite::Row<'_>) -> LoadAuditEntry {
        let phase_str: String = row.get(3).unwrap_or_default();

        LoadAuditEntry {
            id: row.get(0).unwrap_or_default(),
            timestamp: row.get(1).unwrap_or_default(),
            path: row.get(2).unwrap_or_default(),
            phase: serde_json::from_str(&format!("\"{}\"", phase_str))
                .unwrap_or(LoadPhase::LoadError),
            critical: row.get::<_, i32>(4).unwrap_or(0) != 0,
            detail: row.get(5).unwrap_or(None),
        }
    }
}
