//! Human-in-the-Loop Approval
//!
//! Approval authorities for the safety gate. The console authority
//! asks the operator at the terminal; the static authority answers
//! with a fixed verdict for non-interactive runs and tests.

use async_trait::async_trait;
use colored::Colorize;
use dialoguer::Confirm;
use tracing::warn;

use crate::types::{ApprovalAuthority, ApprovalMode, ApprovalRequest, ApprovalVerdict};

// ---------------------------------------------------------------------------
// Console authority
// ---------------------------------------------------------------------------

/// Asks the operator to confirm each request at the terminal. The
/// prompt runs on a blocking thread; the gate's timeout race means a
/// walked-away operator converts into a timed-out verdict.
pub struct ConsoleApprovalAuthority {
    mode: ApprovalMode,
}

impl ConsoleApprovalAuthority {
    pub fn new(mode: ApprovalMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl ApprovalAuthority for ConsoleApprovalAuthority {
    fn approval_mode(&self) -> ApprovalMode {
        self.mode
    }

    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalVerdict {
        println!();
        println!(
            "  {} {} wants to {}",
            "\u{2192}".cyan(),
            request.module_id.white().bold(),
            request.action.white()
        );
        println!("    path: {}", request.path.dimmed());

        let prompt = format!("  Approve {} for '{}'?", request.action, request.module_id);
        let result = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match result {
            Ok(Ok(true)) => ApprovalVerdict::Approved,
            Ok(Ok(false)) => ApprovalVerdict::Rejected("denied at console".to_string()),
            Ok(Err(e)) => {
                warn!("Console prompt failed: {e}");
                ApprovalVerdict::Rejected(format!("console prompt failed: {e}"))
            }
            Err(e) => {
                warn!("Console prompt task failed: {e}");
                ApprovalVerdict::Rejected(format!("console prompt task failed: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Static authority
// ---------------------------------------------------------------------------

/// Answers every request with a fixed verdict. `--yes` runs use an
/// approving instance in autonomous mode; tests use whichever verdict
/// they need.
pub struct StaticAuthority {
    mode: ApprovalMode,
    verdict: ApprovalVerdict,
}

impl StaticAuthority {
    pub fn new(mode: ApprovalMode, verdict: ApprovalVerdict) -> Self {
        Self { mode, verdict }
    }

    /// An autonomous authority that approves everything.
    pub fn approving() -> Self {
        Self::new(ApprovalMode::Autonomous, ApprovalVerdict::Approved)
    }

    /// A supervised authority that rejects everything with `reason`.
    pub fn rejecting(reason: &str) -> Self {
        Self::new(
            ApprovalMode::Supervised,
            ApprovalVerdict::Rejected(reason.to_string()),
        )
    }
}

#[async_trait]
impl ApprovalAuthority for StaticAuthority {
    fn approval_mode(&self) -> ApprovalMode {
        self.mode
    }

    async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalVerdict {
        self.verdict.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            id: "r1".to_string(),
            module_id: "kernel".to_string(),
            path: "core/kernel.mod".to_string(),
            capability: "module_load".to_string(),
            action: "load_module".to_string(),
            data: serde_json::json!({}),
            timeout_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_approving_authority_approves() {
        let authority = StaticAuthority::approving();
        assert_eq!(authority.approval_mode(), ApprovalMode::Autonomous);
        assert!(authority.request_approval(request()).await.is_approved());
    }

    #[tokio::test]
    async fn test_rejecting_authority_carries_reason() {
        let authority = StaticAuthority::rejecting("not today");
        let verdict = authority.request_approval(request()).await;
        assert_eq!(verdict, ApprovalVerdict::Rejected("not today".to_string()));
    }
}
