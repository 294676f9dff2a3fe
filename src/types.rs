//! Protean - Type Definitions
//!
//! All shared types for the self-modifying module runtime: genesis
//! configuration, override and resolution results, the safety-gate
//! pipeline, and the traits its collaborators implement.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─── Genesis Configuration ───────────────────────────────────────

/// One named level in the genesis ladder.  A level may extend a parent
/// level and contributes an ordered list of module ids.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisLevel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
}

/// The full genesis configuration: a map of level name to level.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisConfig {
    pub levels: BTreeMap<String, GenesisLevel>,
}

impl GenesisConfig {
    pub fn level(&self, name: &str) -> Option<&GenesisLevel> {
        self.levels.get(name)
    }
}

// ─── Module Registry ─────────────────────────────────────────────

/// A dependency edge in the module registry.  Registries may declare a
/// dependency as a bare id string or as an object with an `optional`
/// flag; both shapes deserialize into this struct.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "DependencyRepr")]
pub struct ModuleDependency {
    pub id: String,
    pub optional: bool,
}

impl ModuleDependency {
    pub fn required(id: &str) -> Self {
        Self {
            id: id.to_string(),
            optional: false,
        }
    }

    pub fn optional(id: &str) -> Self {
        Self {
            id: id.to_string(),
            optional: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
    Bare(String),
    Full {
        id: String,
        #[serde(default)]
        optional: bool,
    },
}

impl From<DependencyRepr> for ModuleDependency {
    fn from(repr: DependencyRepr) -> Self {
        match repr {
            DependencyRepr::Bare(id) => ModuleDependency {
                id,
                optional: false,
            },
            DependencyRepr::Full { id, optional } => ModuleDependency { id, optional },
        }
    }
}

/// One registry entry: the module's dependencies plus an optional VFS
/// path overriding the `modules/<id>.mod` convention.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRegistryEntry {
    #[serde(default)]
    pub dependencies: Vec<ModuleDependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ─── Module Overrides ────────────────────────────────────────────

/// A validated per-module override.  Anything other than the literal
/// strings "on" / "off" is dropped during normalization.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverrideState {
    On,
    Off,
}

impl OverrideState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideState::On => "on",
            OverrideState::Off => "off",
        }
    }
}

/// Result of normalizing a raw override map: the surviving entries in
/// key order, plus the keys whose values were dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedOverrides {
    pub overrides: BTreeMap<String, OverrideState>,
    pub dropped: Vec<String>,
}

impl NormalizedOverrides {
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

// ─── Module Resolution ───────────────────────────────────────────

/// Outcome of applying overrides to a base module set.  `resolved` is
/// the final set; `added` / `removed` are diffs against the base;
/// `missing_deps` maps each desired module to the required
/// dependencies absent from the final set.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub resolved: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub forced_on: BTreeSet<String>,
    pub forced_off: BTreeSet<String>,
    pub missing_deps: BTreeMap<String, Vec<String>>,
}

impl ResolutionResult {
    pub fn has_missing_deps(&self) -> bool {
        !self.missing_deps.is_empty()
    }
}

// ─── Approval ────────────────────────────────────────────────────

/// How much autonomy the runtime has been granted.  `Autonomous` never
/// requires approval; the other modes require it for critical paths.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Autonomous,
    Supervised,
    Manual,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Autonomous => "autonomous",
            ApprovalMode::Supervised => "supervised",
            ApprovalMode::Manual => "manual",
        }
    }
}

/// Default approval timeout: five minutes.
pub const DEFAULT_APPROVAL_TIMEOUT_MS: u64 = 5 * 60 * 1000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub module_id: String,
    pub path: String,
    pub capability: String,
    pub action: String,
    pub data: serde_json::Value,
    pub timeout_ms: u64,
}

/// The authority's answer to an approval request.  A timed-out request
/// is a distinct outcome so callers can report it as such, but the
/// gate treats anything other than `Approved` as a denial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalVerdict {
    Approved,
    Rejected(String),
    TimedOut,
}

impl ApprovalVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalVerdict::Approved)
    }

    pub fn describe(&self) -> String {
        match self {
            ApprovalVerdict::Approved => "approved".to_string(),
            ApprovalVerdict::Rejected(reason) => format!("rejected: {}", reason),
            ApprovalVerdict::TimedOut => "approval timed out".to_string(),
        }
    }
}

// ─── Verification ────────────────────────────────────────────────

/// What the verification manager reports for a proposed change set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Sandbox verification outcome.  `skipped` is true when gating was
/// disabled or no sandbox/verifier was wired in, in which case the
/// result is a pass by definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxVerificationResult {
    pub passed: bool,
    pub skipped: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl SandboxVerificationResult {
    pub fn skipped() -> Self {
        Self {
            passed: true,
            skipped: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn from_report(report: VerificationReport) -> Self {
        Self {
            passed: report.passed,
            skipped: false,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

/// Opaque handle to a VFS snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub id: String,
}

// ─── Module Loading ──────────────────────────────────────────────

/// Capability a loaded module may expose.  Widget mounting requires
/// `Render`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCapability {
    Render,
    Tool,
    Service,
}

impl ModuleCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleCapability::Render => "render",
            ModuleCapability::Tool => "tool",
            ModuleCapability::Service => "service",
        }
    }
}

/// Phases a module load moves through, recorded in the audit trail.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Requested,
    Approving,
    Approved,
    Blocked,
    Verifying,
    Verified,
    VerificationFailed,
    Loading,
    Loaded,
    LoadError,
}

impl LoadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPhase::Requested => "requested",
            LoadPhase::Approving => "approving",
            LoadPhase::Approved => "approved",
            LoadPhase::Blocked => "blocked",
            LoadPhase::Verifying => "verifying",
            LoadPhase::Verified => "verified",
            LoadPhase::VerificationFailed => "verification_failed",
            LoadPhase::Loading => "loading",
            LoadPhase::Loaded => "loaded",
            LoadPhase::LoadError => "load_error",
        }
    }
}

/// One audit-trail row for a module load.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAuditEntry {
    pub id: String,
    pub timestamp: String,
    pub path: String,
    pub phase: LoadPhase,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ─── Runtime Collaborators ───────────────────────────────────────

/// Read access to the virtual file system modules live in.
#[async_trait]
pub trait Vfs: Send + Sync {
    async fn exists(&self, path: &str) -> anyhow::Result<bool>;
    async fn read(&self, path: &str) -> anyhow::Result<String>;
}

/// Snapshot/apply/restore over a VFS.  `restore_snapshot` must be
/// idempotent: restoring an already-consumed handle is a no-op.
#[async_trait]
pub trait VfsSandbox: Send + Sync {
    async fn create_snapshot(&self) -> anyhow::Result<SnapshotHandle>;
    async fn apply_changes(&self, changes: &BTreeMap<String, String>) -> anyhow::Result<()>;
    async fn restore_snapshot(&self, handle: &SnapshotHandle) -> anyhow::Result<()>;
}

/// Static analysis over a proposed change set (path -> new content).
#[async_trait]
pub trait VerificationManager: Send + Sync {
    async fn verify_proposal(
        &self,
        changes: &BTreeMap<String, String>,
    ) -> anyhow::Result<VerificationReport>;
}

/// A human (or policy) that answers approval requests.  The gate races
/// the returned future against the request's timeout, so authorities
/// may block indefinitely.
#[async_trait]
pub trait ApprovalAuthority: Send + Sync {
    fn approval_mode(&self) -> ApprovalMode;
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalVerdict;
}

/// Turns fetched module content into a live instance.  When `verify`
/// is set the instantiator should run its own content checks before
/// constructing the instance.
#[async_trait]
pub trait ModuleInstantiator: Send + Sync {
    async fn instantiate(
        &self,
        path: &str,
        content: &str,
        verify: bool,
    ) -> anyhow::Result<Arc<dyn ModuleInstance>>;
}

/// A loaded module.
pub trait ModuleInstance: std::fmt::Debug + Send + Sync {
    fn module_id(&self) -> &str;
    fn path(&self) -> &str;
    fn capabilities(&self) -> Vec<ModuleCapability>;
    fn has_capability(&self, capability: ModuleCapability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Sink for load-audit entries.  Recording must never fail the load.
pub trait LoadLedger: Send + Sync {
    fn record(&self, entry: &LoadAuditEntry);
}

// ─── Runtime Configuration ───────────────────────────────────────

/// Path prefixes treated as critical when the operator has not
/// configured their own set.
pub static DEFAULT_CRITICAL_PREFIXES: &[&str] = &["core/", "runtime/", "infra/", "capabilities/"];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub name: String,
    pub db_path: String,
    pub genesis_path: String,
    pub registry_path: String,
    pub critical_prefixes: Vec<String>,
    pub approval_timeout_ms: u64,
    pub log_level: LogLevel,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Returns the default `RuntimeConfig`.  Paths live under `~/.protean`
/// and are tilde-expanded by the config module.
pub fn default_config() -> RuntimeConfig {
    RuntimeConfig {
        name: "protean".to_string(),
        db_path: "~/.protean/state.db".to_string(),
        genesis_path: "~/.protean/genesis.json".to_string(),
        registry_path: "~/.protean/registry.json".to_string(),
        critical_prefixes: DEFAULT_CRITICAL_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect(),
        approval_timeout_ms: DEFAULT_APPROVAL_TIMEOUT_MS,
        log_level: LogLevel::Info,
        version: "0.1.0".to_string(),
    }
}
