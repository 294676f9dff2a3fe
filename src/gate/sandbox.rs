//! Sandboxed Verification
//!
//! Critical module content is applied to a snapshotted VFS and
//! verified there before the real load happens. The snapshot is
//! restored on every exit path: pass, fail, or collaborator error.
//! When gating is disabled or the sandbox/verifier is missing, the
//! step is skipped and reported as such.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::types::{
    SandboxVerificationResult, VerificationManager, VerificationReport, VfsSandbox,
};

/// Verify `content` for `path` inside a sandboxed copy of the VFS.
pub async fn verify_in_sandbox(
    sandbox: Option<&Arc<dyn VfsSandbox>>,
    verifier: Option<&Arc<dyn VerificationManager>>,
    gating_enabled: bool,
    path: &str,
    content: &str,
) -> Result<SandboxVerificationResult> {
    if !gating_enabled {
        warn!("Sandbox gating disabled; skipping verification of {}", path);
        return Ok(SandboxVerificationResult::skipped());
    }

    let (sandbox, verifier) = match (sandbox, verifier) {
        (Some(sandbox), Some(verifier)) => (sandbox, verifier),
        (None, _) => {
            warn!("No VFS sandbox wired in; skipping verification of {}", path);
            return Ok(SandboxVerificationResult::skipped());
        }
        (_, None) => {
            warn!(
                "No verification manager wired in; skipping verification of {}",
                path
            );
            return Ok(SandboxVerificationResult::skipped());
        }
    };

    let mut changes: BTreeMap<String, String> = BTreeMap::new();
    changes.insert(path.to_string(), content.to_string());

    let snapshot = sandbox.create_snapshot().await?;

    // Everything between snapshot and restore runs inside this block
    // so the restore below covers every exit path.
    let outcome: Result<VerificationReport> = async {
        sandbox.apply_changes(&changes).await?;
        verifier.verify_proposal(&changes).await
    }
    .await;

    if let Err(e) = sandbox.restore_snapshot(&snapshot).await {
        error!("Failed to restore VFS snapshot {}: {:#}", snapshot.id, e);
    }

    let report = outcome?;
    debug!(
        "Sandbox verification of {} complete (passed: {})",
        path, report.passed
    );
    Ok(SandboxVerificationResult::from_report(report))
}
