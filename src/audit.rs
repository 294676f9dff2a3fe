//! Load Audit
//!
//! Append-only ledger of every load the gate has processed. Provides
//! the database-backed [`LoadLedger`] implementation plus querying and
//! report-generation facilities.

use std::sync::{Arc, Mutex};

use tracing::error;

use crate::state::Database;
use crate::types::{LoadAuditEntry, LoadLedger};

// ---------------------------------------------------------------------------
// Database-backed ledger
// ---------------------------------------------------------------------------

/// Persists gate phase transitions into the `load_audit` table.
/// Recording failures are logged and swallowed so a broken ledger
/// never fails a load.
pub struct DbLedger {
    db: Arc<Mutex<Database>>,
}

impl DbLedger {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl LoadLedger for DbLedger {
    fn record(&self, entry: &LoadAuditEntry) {
        if let Err(e) = self.db.lock().unwrap().insert_load_audit(entry) {
            error!("Failed to record load audit entry: {:#}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Queries and reports
// ---------------------------------------------------------------------------

/// Retrieve the most recent `limit` audit entries, oldest first.
pub fn get_recent_loads(db: &Database, limit: u32) -> Vec<LoadAuditEntry> {
    db.get_recent_load_audit(limit as i64).unwrap_or_default()
}

/// Retrieve the audit trail for a single module path, oldest first.
pub fn get_loads_for_path(db: &Database, path: &str, limit: u32) -> Vec<LoadAuditEntry> {
    db.get_load_audit_for_path(path, limit as i64)
        .unwrap_or_default()
}

/// Generate a human-readable report summarising recent load activity.
pub fn generate_load_report(db: &Database) -> String {
    let entries = get_recent_loads(db, 50);

    if entries.is_empty() {
        return "No module loads recorded.".to_string();
    }

    let mut report = String::from("=== Module Load Audit Report ===\n\n");
    report.push_str(&format!("Total entries shown: {}\n\n", entries.len()));

    report.push_str("Breakdown by phase:\n");
    for (phase, count) in db.count_load_audit_by_phase().unwrap_or_default() {
        report.push_str(&format!("  {}: {}\n", phase, count));
    }
    report.push('\n');

    report.push_str("Recent activity:\n");
    for entry in &entries {
        let marker = if entry.critical { " [critical]" } else { "" };
        report.push_str(&format!(
            "  [{}] {} - {}{}\n",
            entry.timestamp,
            entry.path,
            entry.phase.as_str(),
            marker,
        ));
        if let Some(ref detail) = entry.detail {
            report.push_str(&format!("    detail: {}\n", detail));
        }
    }

    report
}
