//! SQLite-Backed VFS
//!
//! Bridges the concrete `Database` VFS tables with the `Vfs` and
//! `VfsSandbox` traits. Snapshots copy the full file table into
//! process memory; restore replaces the table in one transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::state::Database;
use crate::types::{SnapshotHandle, Vfs, VfsSandbox};

pub struct SqliteVfs {
    db: Arc<Mutex<Database>>,
    snapshots: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl SqliteVfs {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Write a file directly, bypassing the gate. Used when seeding
    /// the VFS at init time.
    pub fn write(&self, path: &str, content: &str) -> Result<()> {
        self.db.lock().unwrap().vfs_write(path, content)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.db.lock().unwrap().vfs_list()
    }
}

#[async_trait]
impl Vfs for SqliteVfs {
    async fn exists(&self, path: &str) -> Result<bool> {
        self.db.lock().unwrap().vfs_exists(path)
    }

    async fn read(&self, path: &str) -> Result<String> {
        match self.db.lock().unwrap().vfs_read(path)? {
            Some(content) => Ok(content),
            None => bail!("no such file in VFS: {path}"),
        }
    }
}

#[async_trait]
impl VfsSandbox for SqliteVfs {
    async fn create_snapshot(&self) -> Result<SnapshotHandle> {
        let id = Uuid::new_v4().to_string();
        let copy = self.db.lock().unwrap().vfs_all()?;
        self.snapshots.lock().unwrap().insert(id.clone(), copy);
        Ok(SnapshotHandle { id })
    }

    async fn apply_changes(&self, changes: &BTreeMap<String, String>) -> Result<()> {
        let db = self.db.lock().unwrap();
        for (path, content) in changes {
            db.vfs_write(path, content)?;
        }
        Ok(())
    }

    async fn restore_snapshot(&self, handle: &SnapshotHandle) -> Result<()> {
        let saved = self.snapshots.lock().unwrap().remove(&handle.id);
        match saved {
            Some(files) => self.db.lock().unwrap().vfs_replace_all(&files),
            None => {
                debug!("Snapshot {} already restored or unknown", handle.id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs() -> SqliteVfs {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        SqliteVfs::new(db)
    }

    #[tokio::test]
    async fn test_read_through_database() {
        let vfs = vfs();
        vfs.write("core/kernel.mod", "kernel body").unwrap();
        assert!(vfs.exists("core/kernel.mod").await.unwrap());
        assert_eq!(vfs.read("core/kernel.mod").await.unwrap(), "kernel body");
        assert!(vfs.read("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_restore_roundtrip() {
        let vfs = vfs();
        vfs.write("a", "1").unwrap();
        let snapshot = vfs.create_snapshot().await.unwrap();

        let mut changes = BTreeMap::new();
        changes.insert("a".to_string(), "changed".to_string());
        changes.insert("b".to_string(), "new".to_string());
        vfs.apply_changes(&changes).await.unwrap();

        vfs.restore_snapshot(&snapshot).await.unwrap();
        assert_eq!(vfs.read("a").await.unwrap(), "1");
        assert!(!vfs.exists("b").await.unwrap());

        // Restoring again is a no-op, not an error.
        vfs.restore_snapshot(&snapshot).await.unwrap();
        assert_eq!(vfs.read("a").await.unwrap(), "1");
    }
}
