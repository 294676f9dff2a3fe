//! Module Content Verification
//!
//! Static checks over proposed module content before a critical load
//! is allowed through. Each check scans for one family of dangerous
//! patterns; fatal findings become errors and fail verification,
//! advisory findings become warnings and are logged by the gate.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::types::{VerificationManager, VerificationReport};

/// One named finding for a piece of module content.
#[derive(Clone, Debug)]
pub struct ContentCheck {
    pub name: String,
    pub detected: bool,
    pub fatal: bool,
    pub details: Option<String>,
}

/// Run every content check against `content`.
pub fn run_content_checks(content: &str) -> Vec<ContentCheck> {
    vec![
        detect_host_process_escape(content),
        detect_filesystem_tampering(content),
        detect_dynamic_evaluation(content),
        detect_state_tampering(content),
        detect_network_egress(content),
        detect_obfuscated_payload(content),
    ]
}

// --- Detection Functions ---

/// Detect attempts to spawn processes on the host.
pub fn detect_host_process_escape(text: &str) -> ContentCheck {
    let patterns = [
        r"(?i)child_process",
        r"(?i)\bspawn\s*\(",
        r"(?i)\bexecSync\s*\(",
        r"(?i)\bexec\s*\(",
        r"(?i)subprocess",
        r"(?i)\bsystem\s*\(",
        r"(?i)Command::new",
    ];

    let detected = patterns
        .iter()
        .any(|p| Regex::new(p).map(|re| re.is_match(text)).unwrap_or(false));

    ContentCheck {
        name: "host_process_escape".to_string(),
        detected,
        fatal: true,
        details: if detected {
            Some("content spawns host processes".to_string())
        } else {
            None
        },
    }
}

/// Detect destructive file-system access outside the VFS.
pub fn detect_filesystem_tampering(text: &str) -> ContentCheck {
    let patterns = [
        r"(?i)rm\s+-rf",
        r"\.\./",
        r"(?i)/etc/",
        r"(?i)\bunlink\s*\(",
        r"(?i)fs\.rm",
        r"(?i)format\s+(the\s+)?disk",
        r"(?i)drop\s+table",
    ];

    let detected = patterns
        .iter()
        .any(|p| Regex::new(p).map(|re| re.is_match(text)).unwrap_or(false));

    ContentCheck {
        name: "filesystem_tampering".to_string(),
        detected,
        fatal: true,
        details: if detected {
            Some("content reaches outside the VFS or destroys storage".to_string())
        } else {
            None
        },
    }
}

/// Detect dynamic code evaluation.
pub fn detect_dynamic_evaluation(text: &str) -> ContentCheck {
    let patterns = [
        r"(?i)\beval\s*\(",
        r"(?i)new\s+Function\s*\(",
        r"(?i)importScripts\s*\(",
        r"(?i)\bimport\s*\(\s*[^'\x22]",
    ];

    let detected = patterns
        .iter()
        .any(|p| Regex::new(p).map(|re| re.is_match(text)).unwrap_or(false));

    ContentCheck {
        name: "dynamic_evaluation".to_string(),
        detected,
        fatal: true,
        details: if detected {
            Some("content evaluates code built at runtime".to_string())
        } else {
            None
        },
    }
}

/// Detect modules that try to rewrite the runtime's own state: the
/// audit trail, the key-value flags, or the gating switch itself.
pub fn detect_state_tampering(text: &str) -> ContentCheck {
    let patterns = [
        r"(?i)delete\s+from\s+load_audit",
        r"(?i)delete\s+from\s+kv",
        r"(?i)update\s+kv\s+set",
        r"(?i)sandbox_gating\s*=",
        r"(?i)disable\s+(the\s+)?gate",
    ];

    let detected = patterns
        .iter()
        .any(|p| Regex::new(p).map(|re| re.is_match(text)).unwrap_or(false));

    ContentCheck {
        name: "state_tampering".to_string(),
        detected,
        fatal: true,
        details: if detected {
            Some("content tampers with runtime state or the gate".to_string())
        } else {
            None
        },
    }
}

/// Detect network egress. Advisory only: some modules legitimately
/// talk to the network, but a critical module doing so is worth a
/// second look.
pub fn detect_network_egress(text: &str) -> ContentCheck {
    let patterns = [
        r"(?i)\bfetch\s*\(",
        r"(?i)XMLHttpRequest",
        r"(?i)new\s+WebSocket",
        r"(?i)https?://",
    ];

    let detected = patterns
        .iter()
        .any(|p| Regex::new(p).map(|re| re.is_match(text)).unwrap_or(false));

    ContentCheck {
        name: "network_egress".to_string(),
        detected,
        fatal: false,
        details: if detected {
            Some("content performs network egress".to_string())
        } else {
            None
        },
    }
}

/// Detect obfuscated payloads (long base64 runs, excessive unicode
/// escapes, decode helpers). Advisory only.
pub fn detect_obfuscated_payload(text: &str) -> ContentCheck {
    let has_long_base64 = Regex::new(r"[A-Za-z0-9+/]{60,}={0,2}")
        .map(|re| re.is_match(text))
        .unwrap_or(false);

    let unicode_escape_count = Regex::new(r"\\u[0-9a-fA-F]{4}")
        .map(|re| re.find_iter(text).count())
        .unwrap_or(0);
    let has_excessive_unicode = unicode_escape_count > 5;

    let has_decode_helper = Regex::new(r"(?i)\batob\b|\bbtoa\b|base64_decode")
        .map(|re| re.is_match(text))
        .unwrap_or(false);

    let detected = has_long_base64 || has_excessive_unicode || has_decode_helper;

    ContentCheck {
        name: "obfuscated_payload".to_string(),
        detected,
        fatal: false,
        details: if detected {
            Some("content looks obfuscated".to_string())
        } else {
            None
        },
    }
}

// --- Verifier ---

/// Pattern-based implementation of [`VerificationManager`]. Scans each
/// file in a proposed change set and fails the proposal when any fatal
/// check fires.
#[derive(Default)]
pub struct PatternVerifier;

impl PatternVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VerificationManager for PatternVerifier {
    async fn verify_proposal(
        &self,
        changes: &BTreeMap<String, String>,
    ) -> anyhow::Result<VerificationReport> {
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        for (path, content) in changes {
            for check in run_content_checks(content) {
                if !check.detected {
                    continue;
                }
                let detail = check.details.unwrap_or_else(|| check.name.clone());
                let finding = format!("{}: {}", path, detail);
                if check.fatal {
                    errors.push(finding);
                } else {
                    warnings.push(finding);
                }
            }
        }

        debug!(
            "Verified {} file(s): {} error(s), {} warning(s)",
            changes.len(),
            errors.len(),
            warnings.len()
        );

        Ok(VerificationReport {
            passed: errors.is_empty(),
            errors,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_clean_content_passes() {
        let verifier = PatternVerifier::new();
        let report = verifier
            .verify_proposal(&changes(&[(
                "modules/ui.mod",
                "render() { return 'hello'; }",
            )]))
            .await
            .unwrap();
        assert!(report.passed);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_process_spawn_fails() {
        let verifier = PatternVerifier::new();
        let report = verifier
            .verify_proposal(&changes(&[(
                "core/kernel.mod",
                "const cp = require('child_process'); cp.spawn('sh');",
            )]))
            .await
            .unwrap();
        assert!(!report.passed);
        assert!(report.errors[0].contains("core/kernel.mod"));
    }

    #[tokio::test]
    async fn test_path_traversal_fails() {
        let verifier = PatternVerifier::new();
        let report = verifier
            .verify_proposal(&changes(&[("m", "read('../../secrets')")]))
            .await
            .unwrap();
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_network_egress_is_warning_only() {
        let verifier = PatternVerifier::new();
        let report = verifier
            .verify_proposal(&changes(&[("m", "fetch('https://example.com/data')")]))
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_findings_aggregate_across_files() {
        let verifier = PatternVerifier::new();
        let report = verifier
            .verify_proposal(&changes(&[
                ("a", "eval(payload)"),
                ("b", "rm -rf /"),
                ("c", "plain text"),
            ]))
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_state_tampering_detected() {
        let check = detect_state_tampering("DELETE FROM load_audit WHERE 1=1");
        assert!(check.detected);
        assert!(check.fatal);
    }

    #[test]
    fn test_obfuscation_detected_on_long_base64() {
        let blob = "QUJDREVGRw".repeat(10);
        let check = detect_obfuscated_payload(&blob);
        assert!(check.detected);
        assert!(!check.fatal);
    }
}
