//! Protean Runtime
//!
//! The entry point for the self-modifying module runtime.
//! Handles CLI args, runtime bootstrap, and dispatching module
//! loads through the safety gate.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use protean::audit::{generate_load_report, DbLedger};
use protean::config::{
    get_config_path, get_runtime_dir, load_approval_mode, load_config, load_gating_flag,
    load_module_overrides, resolve_path, save_config, save_gating_flag, save_module_overrides,
    ConfigError,
};
use protean::gate::{create_safety_gate, SafetyGate, SafetyGateOptions};
use protean::genesis::config::{
    load_genesis_config, load_module_registry, write_default_genesis_config,
    write_default_module_registry, SEED_MODULES,
};
use protean::genesis::levels::resolve_base_modules;
use protean::genesis::registry::ModuleRegistry;
use protean::genesis::resolver::apply_module_overrides;
use protean::hitl::{ConsoleApprovalAuthority, StaticAuthority};
use protean::modules::instantiate::ManifestInstantiator;
use protean::state::Database;
use protean::types::{
    default_config, ApprovalAuthority, LogLevel, OverrideState, ResolutionResult, RuntimeConfig,
};
use protean::verify::PatternVerifier;
use protean::vfs::SqliteVfs;

const VERSION: &str = "0.1.0";

/// Protean -- Self-Modifying Module Runtime
#[derive(Parser, Debug)]
#[command(
    name = "protean",
    version = VERSION,
    about = "Protean -- Self-Modifying Module Runtime",
    long_about = "Module runtime with genesis levels, per-module overrides, and a safety gate in front of every load."
)]
struct Cli {
    /// Initialize config, genesis files, and the seeded module VFS
    #[arg(long)]
    init: bool,

    /// Resolve a genesis level against the stored overrides
    #[arg(long, value_name = "LEVEL")]
    resolve: Option<String>,

    /// Resolve a genesis level and load every resolved module
    #[arg(long, value_name = "LEVEL")]
    boot: Option<String>,

    /// Load a single module by VFS path
    #[arg(long, value_name = "PATH")]
    load: Option<String>,

    /// Load a module as a widget (requires the render capability)
    #[arg(long, value_name = "PATH")]
    widget: Option<String>,

    /// Container id for --widget
    #[arg(long, value_name = "ID", default_value = "root")]
    container: String,

    /// Set a module override, e.g. telemetry=off
    #[arg(long = "override", value_name = "ID=on|off")]
    set_override: Option<String>,

    /// Clear a module override
    #[arg(long, value_name = "ID")]
    clear_override: Option<String>,

    /// Enable or disable sandbox gating (on|off)
    #[arg(long, value_name = "on|off")]
    gating: Option<String>,

    /// Show runtime status
    #[arg(long)]
    status: bool,

    /// Print the load audit report
    #[arg(long)]
    audit: bool,

    /// Approve all requests without prompting
    #[arg(long)]
    yes: bool,
}

// ---- Runtime Wiring ---------------------------------------------------------

fn init_logging(level: &LogLevel) {
    let max_level = match level {
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Error => tracing::Level::ERROR,
    };
    tracing_subscriber::fmt().with_max_level(max_level).init();
}

fn load_config_or_exit() -> RuntimeConfig {
    match load_config() {
        Ok(config) => config,
        Err(ConfigError::Missing { path }) => {
            eprintln!("No config at {}. Run: protean --init", path);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

fn open_database(config: &RuntimeConfig) -> Result<Arc<Mutex<Database>>> {
    let db = Database::open(&resolve_path(&config.db_path))?;
    Ok(Arc::new(Mutex::new(db)))
}

/// Wire a safety gate over the SQLite VFS, reading the gating flag and
/// approval mode from the kv table.
fn build_gate(
    config: &RuntimeConfig,
    db: Arc<Mutex<Database>>,
    assume_yes: bool,
) -> Result<SafetyGate> {
    let (gating, mode) = {
        let db_ref = db.lock().unwrap();
        (load_gating_flag(&db_ref)?, load_approval_mode(&db_ref)?)
    };

    let vfs = Arc::new(SqliteVfs::new(db.clone()));
    let verifier = Arc::new(PatternVerifier::new());
    let authority: Arc<dyn ApprovalAuthority> = if assume_yes {
        Arc::new(StaticAuthority::approving())
    } else {
        Arc::new(ConsoleApprovalAuthority::new(mode))
    };

    let mut options = SafetyGateOptions::new(
        vfs.clone(),
        Arc::new(ManifestInstantiator::new(Some(verifier.clone()))),
    );
    options.sandbox = Some(vfs);
    options.verifier = Some(verifier);
    options.authority = Some(authority);
    options.ledger = Some(Arc::new(DbLedger::new(db)));
    options.critical_prefixes = config.critical_prefixes.clone();
    options.approval_timeout_ms = config.approval_timeout_ms;
    options.sandbox_gating = gating;

    Ok(create_safety_gate(options))
}

// ---- Init Command -----------------------------------------------------------

/// Write the default config, genesis files, and seed modules. Existing
/// files are left alone, so re-running is safe.
fn init_runtime() -> Result<()> {
    let config = match load_config() {
        Ok(existing) => existing,
        Err(ConfigError::Missing { .. }) => {
            let fresh = default_config();
            save_config(&fresh)?;
            println!("Wrote config to {}", get_config_path().display());
            fresh
        }
        Err(e) => return Err(e.into()),
    };

    write_default_genesis_config(Path::new(&resolve_path(&config.genesis_path)))?;
    write_default_module_registry(Path::new(&resolve_path(&config.registry_path)))?;

    let db = open_database(&config)?;
    let vfs = SqliteVfs::new(db.clone());
    let mut seeded = 0;
    for (path, content) in SEED_MODULES {
        if !db.lock().unwrap().vfs_exists(path)? {
            vfs.write(path, content)?;
            seeded += 1;
        }
    }

    println!(
        "{}",
        serde_json::json!({
            "configDir": get_runtime_dir().to_string_lossy(),
            "dbPath": resolve_path(&config.db_path),
            "seededModules": seeded,
        })
    );
    Ok(())
}

// ---- Resolve Command --------------------------------------------------------

struct Resolution {
    base: Vec<String>,
    result: ResolutionResult,
    registry: ModuleRegistry,
}

fn resolve_level(
    config: &RuntimeConfig,
    db: &Arc<Mutex<Database>>,
    level: &str,
) -> Result<Resolution> {
    let genesis = load_genesis_config(Path::new(&resolve_path(&config.genesis_path)))?;
    let registry = load_module_registry(Path::new(&resolve_path(&config.registry_path)))?;
    let overrides = load_module_overrides(&db.lock().unwrap())?;

    let base = resolve_base_modules(level, &genesis)?;
    let result = apply_module_overrides(&base, &registry, &overrides.overrides);
    Ok(Resolution {
        base,
        result,
        registry,
    })
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn show_resolution(level: &str, resolution: &Resolution) {
    let result = &resolution.result;
    println!();
    println!("  level:    {}", level.white().bold());
    println!("  base:     {}", resolution.base.join(", "));
    println!("  resolved: {}", join_set(&result.resolved));
    if !result.added.is_empty() {
        println!("  added:    {}", join_set(&result.added).green());
    }
    if !result.removed.is_empty() {
        println!("  removed:  {}", join_set(&result.removed).red());
    }
    for (id, deps) in &result.missing_deps {
        println!(
            "  {} {} is missing required deps: {}",
            "!".yellow(),
            id,
            deps.join(", ")
        );
    }
    println!();
}

// ---- Boot Command -----------------------------------------------------------

/// Resolve `level` and push every resolved module through the gate.
/// Individual load failures are reported and skipped.
async fn boot(
    config: &RuntimeConfig,
    db: Arc<Mutex<Database>>,
    level: &str,
    assume_yes: bool,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    println!("[{}] Protean v{} booting level '{}'...", now, VERSION, level);

    let resolution = resolve_level(config, &db, level)?;
    show_resolution(level, &resolution);

    let gate = build_gate(config, db, assume_yes)?;
    let mut loaded = 0;
    let mut failed = 0;

    for id in &resolution.result.resolved {
        let path = resolution.registry.module_path(id);
        match gate.load_module(&path).await {
            Ok(instance) => {
                let now = chrono::Utc::now().to_rfc3339();
                println!("[{}] {} {}", now, "loaded".green(), instance.module_id());
                loaded += 1;
            }
            Err(e) => {
                let now = chrono::Utc::now().to_rfc3339();
                println!("[{}] {} {}: {}", now, "failed".red(), path, e);
                failed += 1;
            }
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    println!(
        "[{}] Boot complete: {} loaded, {} failed",
        now, loaded, failed
    );
    Ok(())
}

// ---- Load / Widget Commands -------------------------------------------------

fn describe_capabilities(instance: &dyn protean::types::ModuleInstance) -> String {
    let capabilities = instance.capabilities();
    if capabilities.is_empty() {
        "none".to_string()
    } else {
        capabilities
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

async fn load_one(
    config: &RuntimeConfig,
    db: Arc<Mutex<Database>>,
    path: &str,
    assume_yes: bool,
) -> Result<()> {
    let gate = build_gate(config, db, assume_yes)?;
    let instance = gate.load_module(path).await?;
    println!(
        "Loaded {} (capabilities: {})",
        instance.module_id().white().bold(),
        describe_capabilities(instance.as_ref())
    );
    Ok(())
}

async fn mount_widget(
    config: &RuntimeConfig,
    db: Arc<Mutex<Database>>,
    path: &str,
    container: &str,
    assume_yes: bool,
) -> Result<()> {
    let gate = build_gate(config, db, assume_yes)?;
    let widget = gate.load_widget(path, container).await?;
    println!(
        "Mounted {} in container '{}'",
        widget.module_id().white().bold(),
        container
    );
    Ok(())
}

// ---- Override / Gating Commands ---------------------------------------------

fn overrides_to_value(
    overrides: &std::collections::BTreeMap<String, OverrideState>,
    skip: Option<&str>,
) -> serde_json::Value {
    let mut raw = serde_json::Map::new();
    for (key, state) in overrides {
        if Some(key.as_str()) == skip {
            continue;
        }
        raw.insert(
            key.clone(),
            serde_json::Value::String(state.as_str().to_string()),
        );
    }
    serde_json::Value::Object(raw)
}

fn set_override(db: &Arc<Mutex<Database>>, spec: &str) -> Result<()> {
    let (id, state) = spec
        .split_once('=')
        .context("override must be of the form ID=on|off")?;
    let state = match state {
        "on" => OverrideState::On,
        "off" => OverrideState::Off,
        other => anyhow::bail!("override state must be 'on' or 'off', got '{}'", other),
    };

    let db_ref = db.lock().unwrap();
    let mut current = load_module_overrides(&db_ref)?;
    current.overrides.insert(id.to_string(), state);
    save_module_overrides(&db_ref, &overrides_to_value(&current.overrides, None))?;

    println!("Override set: {} = {}", id, state.as_str());
    Ok(())
}

fn clear_override(db: &Arc<Mutex<Database>>, id: &str) -> Result<()> {
    let db_ref = db.lock().unwrap();
    let current = load_module_overrides(&db_ref)?;
    if !current.overrides.contains_key(id) {
        println!("No override set for {}", id);
        return Ok(());
    }
    save_module_overrides(&db_ref, &overrides_to_value(&current.overrides, Some(id)))?;

    println!("Override cleared: {}", id);
    Ok(())
}

fn set_gating(db: &Arc<Mutex<Database>>, value: &str) -> Result<()> {
    let enabled = match value {
        "on" => true,
        "off" => false,
        other => anyhow::bail!("gating must be 'on' or 'off', got '{}'", other),
    };
    save_gating_flag(&db.lock().unwrap(), enabled)?;

    println!(
        "Sandbox gating {}",
        if enabled { "enabled" } else { "disabled" }
    );
    if !enabled {
        println!(
            "{}",
            "Critical module loads will skip sandbox verification.".yellow()
        );
    }
    Ok(())
}

// ---- Status Command ---------------------------------------------------------

/// Display the current runtime status.
fn show_status(config: &RuntimeConfig, db: &Arc<Mutex<Database>>) {
    let db_ref = db.lock().unwrap();

    let gating = match load_gating_flag(&db_ref) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Failed to read gating flag: {}", e);
            return;
        }
    };
    let mode = match load_approval_mode(&db_ref) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to read approval mode: {}", e);
            return;
        }
    };
    let overrides = match load_module_overrides(&db_ref) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Failed to read overrides: {}", e);
            return;
        }
    };
    let modules = db_ref.vfs_list().unwrap_or_default();

    let override_summary = if overrides.is_empty() {
        "none".to_string()
    } else {
        overrides
            .overrides
            .iter()
            .map(|(id, state)| format!("{}={}", id, state.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!(
        r#"
=== PROTEAN STATUS ===
Name:       {}
DB Path:    {}
Genesis:    {}
Registry:   {}
Gating:     {}
Approvals:  {}
Overrides:  {}
Modules:    {}
Version:    {}
======================
"#,
        config.name,
        resolve_path(&config.db_path),
        resolve_path(&config.genesis_path),
        resolve_path(&config.registry_path),
        if gating { "on" } else { "off" },
        mode.as_str(),
        override_summary,
        modules.len(),
        config.version,
    );
}

// ---- Entry Point ------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.init {
        init_logging(&default_config().log_level);
        if let Err(e) = init_runtime() {
            eprintln!("Init failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let config = load_config_or_exit();
    init_logging(&config.log_level);

    let db = match open_database(&config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(spec) = cli.set_override.as_deref() {
        if let Err(e) = set_override(&db, spec) {
            eprintln!("Failed to set override: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Some(id) = cli.clear_override.as_deref() {
        if let Err(e) = clear_override(&db, id) {
            eprintln!("Failed to clear override: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Some(value) = cli.gating.as_deref() {
        if let Err(e) = set_gating(&db, value) {
            eprintln!("Failed to set gating: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if cli.status {
        show_status(&config, &db);
        return;
    }

    if cli.audit {
        println!("{}", generate_load_report(&db.lock().unwrap()));
        return;
    }

    if let Some(level) = cli.resolve.as_deref() {
        match resolve_level(&config, &db, level) {
            Ok(resolution) => show_resolution(level, &resolution),
            Err(e) => {
                eprintln!("Resolve failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(level) = cli.boot.as_deref() {
        if let Err(e) = boot(&config, db, level, cli.yes).await {
            eprintln!("Boot failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Some(path) = cli.load.as_deref() {
        if let Err(e) = load_one(&config, db, path, cli.yes).await {
            eprintln!("Load failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Some(path) = cli.widget.as_deref() {
        if let Err(e) = mount_widget(&config, db, path, &cli.container, cli.yes).await {
            eprintln!("Widget load failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Default: show help
    println!("Run \"protean --help\" for usage information.");
    println!("Run \"protean --init\" then \"protean --boot standard\" to get started.");
}
