//! Safety Gate
//!
//! The gate every module load goes through. A load walks a fixed
//! pipeline: existence check, content fetch, approval for critical
//! paths, sandboxed verification for critical paths, instantiation.
//! Each phase transition lands in the load ledger so the audit trail
//! reconstructs exactly how far a load got and why it stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::types::{
    ApprovalAuthority, LoadAuditEntry, LoadLedger, LoadPhase, ModuleCapability, ModuleInstance,
    ModuleInstantiator, VerificationManager, Vfs, VfsSandbox, DEFAULT_APPROVAL_TIMEOUT_MS,
    DEFAULT_CRITICAL_PREFIXES,
};

use super::approval::{build_approval_request, request_approval, requires_approval};
use super::critical::is_critical_path;
use super::sandbox::verify_in_sandbox;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a module load failed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module not found: {path}")]
    NotFound { path: String },

    #[error("module load blocked: {reason}")]
    Blocked { reason: String },

    #[error("module verification failed: {}", .errors.join("; "))]
    VerificationFailed { errors: Vec<String> },

    #[error("module {path} does not expose the render capability")]
    InvalidWidget { path: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, LoadError::Blocked { .. })
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Options for creating a safety gate.
pub struct SafetyGateOptions {
    /// File system modules are fetched from.
    pub vfs: Arc<dyn Vfs>,
    /// Turns fetched content into live instances.
    pub instantiator: Arc<dyn ModuleInstantiator>,
    /// Sandbox used for pre-load verification of critical modules.
    pub sandbox: Option<Arc<dyn VfsSandbox>>,
    /// Verifier run inside the sandbox.
    pub verifier: Option<Arc<dyn VerificationManager>>,
    /// Authority consulted for critical loads.
    pub authority: Option<Arc<dyn ApprovalAuthority>>,
    /// Sink for phase-transition audit entries.
    pub ledger: Option<Arc<dyn LoadLedger>>,
    /// Path prefixes that mark a module as critical.
    pub critical_prefixes: Vec<String>,
    /// How long to wait for an approval verdict.
    pub approval_timeout_ms: u64,
    /// Whether sandboxed verification is active.
    pub sandbox_gating: bool,
}

impl SafetyGateOptions {
    pub fn new(vfs: Arc<dyn Vfs>, instantiator: Arc<dyn ModuleInstantiator>) -> Self {
        Self {
            vfs,
            instantiator,
            sandbox: None,
            verifier: None,
            authority: None,
            ledger: None,
            critical_prefixes: DEFAULT_CRITICAL_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            approval_timeout_ms: DEFAULT_APPROVAL_TIMEOUT_MS,
            sandbox_gating: true,
        }
    }
}

/// The safety gate. Mediates every module load against the approval
/// authority and the sandbox verifier.
pub struct SafetyGate {
    vfs: Arc<dyn Vfs>,
    instantiator: Arc<dyn ModuleInstantiator>,
    sandbox: Option<Arc<dyn VfsSandbox>>,
    verifier: Option<Arc<dyn VerificationManager>>,
    authority: Option<Arc<dyn ApprovalAuthority>>,
    ledger: Option<Arc<dyn LoadLedger>>,
    critical_prefixes: Vec<String>,
    approval_timeout_ms: u64,
    sandbox_gating: AtomicBool,
}

/// Create a new safety gate from the given options.
pub fn create_safety_gate(options: SafetyGateOptions) -> SafetyGate {
    SafetyGate {
        vfs: options.vfs,
        instantiator: options.instantiator,
        sandbox: options.sandbox,
        verifier: options.verifier,
        authority: options.authority,
        ledger: options.ledger,
        critical_prefixes: options.critical_prefixes,
        approval_timeout_ms: options.approval_timeout_ms,
        sandbox_gating: AtomicBool::new(options.sandbox_gating),
    }
}

impl SafetyGate {
    /// Whether sandboxed verification is currently active.
    pub fn sandbox_gating(&self) -> bool {
        self.sandbox_gating.load(Ordering::SeqCst)
    }

    /// Flip sandboxed verification at runtime. Disabling it is loud:
    /// every subsequent critical load logs the skip.
    pub fn set_sandbox_gating(&self, enabled: bool) {
        self.sandbox_gating.store(enabled, Ordering::SeqCst);
        info!(
            "Sandbox gating {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Whether `path` sits under a critical prefix.
    pub fn is_critical_path(&self, path: &str) -> bool {
        is_critical_path(path, &self.critical_prefixes)
    }

    /// Whether loading `path` needs an approval verdict first.
    pub fn requires_approval(&self, path: &str) -> bool {
        requires_approval(self.authority.as_ref(), path, &self.critical_prefixes)
    }

    fn record(&self, path: &str, phase: LoadPhase, critical: bool, detail: Option<String>) {
        if let Some(ledger) = &self.ledger {
            ledger.record(&LoadAuditEntry {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now().to_rfc3339(),
                path: path.to_string(),
                phase,
                critical,
                detail,
            });
        }
    }

    /// Load the module at `path` through the full gate pipeline.
    pub async fn load_module(&self, path: &str) -> Result<Arc<dyn ModuleInstance>, LoadError> {
        let critical = self.is_critical_path(path);
        info!("Loading module {} (critical: {})", path, critical);
        self.record(path, LoadPhase::Requested, critical, None);

        if !self.vfs.exists(path).await? {
            self.record(
                path,
                LoadPhase::LoadError,
                critical,
                Some("not found".to_string()),
            );
            return Err(LoadError::NotFound {
                path: path.to_string(),
            });
        }

        let content = self.vfs.read(path).await?;

        if self.requires_approval(path) {
            self.record(path, LoadPhase::Approving, critical, None);
            let request = build_approval_request(path, critical, self.approval_timeout_ms);
            let verdict = request_approval(self.authority.as_ref(), request).await;
            if verdict.is_approved() {
                self.record(path, LoadPhase::Approved, critical, None);
            } else {
                let reason = verdict.describe();
                warn!("Load of {} blocked: {}", path, reason);
                self.record(path, LoadPhase::Blocked, critical, Some(reason.clone()));
                return Err(LoadError::Blocked { reason });
            }
        }

        if critical {
            self.record(path, LoadPhase::Verifying, critical, None);
            let result = verify_in_sandbox(
                self.sandbox.as_ref(),
                self.verifier.as_ref(),
                self.sandbox_gating(),
                path,
                &content,
            )
            .await?;

            if !result.passed {
                self.record(
                    path,
                    LoadPhase::VerificationFailed,
                    critical,
                    Some(result.errors.join("; ")),
                );
                return Err(LoadError::VerificationFailed {
                    errors: result.errors,
                });
            }
            for warning in &result.warnings {
                warn!("Verification warning for {}: {}", path, warning);
            }
            let detail = result.skipped.then(|| "skipped".to_string());
            self.record(path, LoadPhase::Verified, critical, detail);
        }

        // Critical content was already vetted in the sandbox; everything
        // else gets checked at instantiation time instead.
        self.record(path, LoadPhase::Loading, critical, None);
        match self.instantiator.instantiate(path, &content, !critical).await {
            Ok(instance) => {
                info!("Loaded module {} as {}", path, instance.module_id());
                self.record(path, LoadPhase::Loaded, critical, None);
                Ok(instance)
            }
            Err(e) => {
                error!("Failed to instantiate module {}: {:#}", path, e);
                self.record(path, LoadPhase::LoadError, critical, Some(format!("{:#}", e)));
                Err(LoadError::Other(e))
            }
        }
    }

    /// Load `path` and mount it as a widget. The module must expose
    /// the render capability.
    pub async fn load_widget(
        &self,
        path: &str,
        container_id: &str,
    ) -> Result<Arc<dyn ModuleInstance>, LoadError> {
        let instance = self.load_module(path).await?;

        if !instance.has_capability(ModuleCapability::Render) {
            warn!(
                "Module {} lacks the render capability; refusing to mount in {}",
                path, container_id
            );
            return Err(LoadError::InvalidWidget {
                path: path.to_string(),
            });
        }

        info!(
            "Mounted widget {} into container {}",
            instance.module_id(),
            container_id
        );
        Ok(instance)
    }
}
