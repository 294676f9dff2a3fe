//! Virtual File System Module
//!
//! Module sources live in a VFS rather than on the host file system.
//! Two backends: an in-memory store used for sandboxed work and tests,
//! and a SQLite-backed store for the persistent runtime. Both support
//! snapshot/apply/restore for the safety gate.

mod memory;
mod sqlite;

pub use memory::MemoryVfs;
pub use sqlite::SqliteVfs;
