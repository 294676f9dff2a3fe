//! In-Memory VFS
//!
//! A map-backed virtual file system with snapshot support. Snapshots
//! are full copies keyed by a generated id; restoring a handle that
//! was already consumed is a no-op.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::types::{SnapshotHandle, Vfs, VfsSandbox};

#[derive(Default)]
pub struct MemoryVfs {
    files: RwLock<BTreeMap<String, String>>,
    snapshots: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryVfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a VFS pre-populated with `files`.
    pub fn seeded(files: &[(&str, &str)]) -> Self {
        let vfs = Self::new();
        for (path, content) in files {
            vfs.write(path, content);
        }
        vfs
    }

    pub fn write(&self, path: &str, content: &str) {
        self.files
            .write()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.files.write().unwrap().remove(path);
    }

    pub fn file_count(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().unwrap().len()
    }
}

#[async_trait]
impl Vfs for MemoryVfs {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().unwrap().contains_key(path))
    }

    async fn read(&self, path: &str) -> Result<String> {
        match self.files.read().unwrap().get(path) {
            Some(content) => Ok(content.clone()),
            None => bail!("no such file in VFS: {path}"),
        }
    }
}

#[async_trait]
impl VfsSandbox for MemoryVfs {
    async fn create_snapshot(&self) -> Result<SnapshotHandle> {
        let id = Uuid::new_v4().to_string();
        let copy = self.files.read().unwrap().clone();
        self.snapshots.write().unwrap().insert(id.clone(), copy);
        Ok(SnapshotHandle { id })
    }

    async fn apply_changes(&self, changes: &BTreeMap<String, String>) -> Result<()> {
        let mut files = self.files.write().unwrap();
        for (path, content) in changes {
            files.insert(path.clone(), content.clone());
        }
        Ok(())
    }

    async fn restore_snapshot(&self, handle: &SnapshotHandle) -> Result<()> {
        match self.snapshots.write().unwrap().remove(&handle.id) {
            Some(saved) => {
                *self.files.write().unwrap() = saved;
            }
            None => {
                debug!("Snapshot {} already restored or unknown", handle.id);
            }
        }
        Ok(())
    }
}
