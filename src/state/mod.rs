//! Runtime State Module
//!
//! SQLite-backed persistent state for the runtime: flags, overrides,
//! the module-load audit trail, and the virtual file system.

mod database;
mod schema;

pub use database::Database;
pub use schema::{CREATE_TABLES, SCHEMA_VERSION};
