//! Load Approval
//!
//! Decides which loads need a human verdict and obtains it. The
//! authority's future is raced against the request timeout, so a
//! stalled operator turns into a timed-out verdict instead of a hung
//! load. Running with no authority at all fails open: loads proceed,
//! and the gap is logged loudly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::gate::critical::is_critical_path;
use crate::modules::format::extract_id_from_path;
use crate::types::{ApprovalAuthority, ApprovalMode, ApprovalRequest, ApprovalVerdict};

/// Whether loading `path` needs a verdict from the authority.
///
/// Without an authority there is nobody to ask, so nothing requires
/// approval. An autonomous authority never requires approval; any
/// other mode requires it exactly for critical paths.
pub fn requires_approval(
    authority: Option<&Arc<dyn ApprovalAuthority>>,
    path: &str,
    critical_prefixes: &[String],
) -> bool {
    match authority {
        None => {
            warn!(
                "No approval authority wired in; load of {} proceeds without approval",
                path
            );
            false
        }
        Some(authority) => match authority.approval_mode() {
            ApprovalMode::Autonomous => false,
            ApprovalMode::Supervised | ApprovalMode::Manual => {
                is_critical_path(path, critical_prefixes)
            }
        },
    }
}

/// Build the approval request for loading `path`.
pub fn build_approval_request(path: &str, critical: bool, timeout_ms: u64) -> ApprovalRequest {
    ApprovalRequest {
        id: Uuid::new_v4().to_string(),
        module_id: extract_id_from_path(path),
        path: path.to_string(),
        capability: "module_load".to_string(),
        action: "load_module".to_string(),
        data: serde_json::json!({ "path": path, "critical": critical }),
        timeout_ms,
    }
}

/// Obtain a verdict for `request`, racing the authority against the
/// request's timeout. With no authority the request is auto-approved
/// (and the fail-open logged).
pub async fn request_approval(
    authority: Option<&Arc<dyn ApprovalAuthority>>,
    request: ApprovalRequest,
) -> ApprovalVerdict {
    let authority = match authority {
        Some(authority) => authority,
        None => {
            warn!(
                "No approval authority wired in; auto-approving load of {}",
                request.path
            );
            return ApprovalVerdict::Approved;
        }
    };

    let timeout = Duration::from_millis(request.timeout_ms);
    let path = request.path.clone();
    debug!(
        "Requesting approval for {} (timeout {}ms)",
        path, request.timeout_ms
    );

    match tokio::time::timeout(timeout, authority.request_approval(request)).await {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!("Approval request for {} timed out after {:?}", path, timeout);
            ApprovalVerdict::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitl::StaticAuthority;
    use async_trait::async_trait;

    struct HangingAuthority;

    #[async_trait]
    impl ApprovalAuthority for HangingAuthority {
        fn approval_mode(&self) -> ApprovalMode {
            ApprovalMode::Supervised
        }

        async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalVerdict {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ApprovalVerdict::Approved
        }
    }

    fn prefixes() -> Vec<String> {
        vec!["core/".to_string()]
    }

    #[test]
    fn test_no_authority_requires_nothing() {
        assert!(!requires_approval(None, "core/kernel.mod", &prefixes()));
    }

    #[test]
    fn test_autonomous_mode_requires_nothing() {
        let authority: Arc<dyn ApprovalAuthority> = Arc::new(StaticAuthority::approving());
        assert!(!requires_approval(
            Some(&authority),
            "core/kernel.mod",
            &prefixes()
        ));
    }

    #[test]
    fn test_supervised_mode_requires_exactly_critical() {
        let authority: Arc<dyn ApprovalAuthority> =
            Arc::new(StaticAuthority::rejecting("nope"));
        assert!(requires_approval(
            Some(&authority),
            "core/kernel.mod",
            &prefixes()
        ));
        assert!(!requires_approval(
            Some(&authority),
            "modules/ui.mod",
            &prefixes()
        ));
    }

    #[test]
    fn test_request_carries_module_identity() {
        let request = build_approval_request("core/kernel.mod", true, 5000);
        assert_eq!(request.module_id, "kernel");
        assert_eq!(request.path, "core/kernel.mod");
        assert_eq!(request.timeout_ms, 5000);
        assert_eq!(request.data["critical"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_no_authority_auto_approves() {
        let request = build_approval_request("modules/ui.mod", false, 50);
        let verdict = request_approval(None, request).await;
        assert_eq!(verdict, ApprovalVerdict::Approved);
    }

    #[tokio::test]
    async fn test_rejection_passes_through() {
        let authority: Arc<dyn ApprovalAuthority> =
            Arc::new(StaticAuthority::rejecting("not today"));
        let request = build_approval_request("core/kernel.mod", true, 1000);
        let verdict = request_approval(Some(&authority), request).await;
        assert_eq!(verdict, ApprovalVerdict::Rejected("not today".to_string()));
    }

    #[tokio::test]
    async fn test_stalled_authority_times_out() {
        let authority: Arc<dyn ApprovalAuthority> = Arc::new(HangingAuthority);
        let request = build_approval_request("core/kernel.mod", true, 50);
        let verdict = request_approval(Some(&authority), request).await;
        assert_eq!(verdict, ApprovalVerdict::TimedOut);
    }
}
