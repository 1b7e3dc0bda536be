// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod names;
pub mod notifiers;
pub mod registry;
pub mod samplesheet;
pub mod service;
pub mod store;
pub mod system;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::engine::{install_shutdown_handler, run_service};
use crate::registry::Registry;
use crate::store::Store;
use crate::system::System;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the entity store
/// - the configured submitters, jobs and notifiers
/// - the watcher, both pollers and signal handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    cfg.service.watch_root = cfg
        .service
        .watch_root
        .canonicalize()
        .with_context(|| format!("watch root {}", cfg.service.watch_root.display()))?;

    let store = Store::open(&cfg.service.database)
        .with_context(|| format!("opening database {}", cfg.service.database.display()))?;
    info!(database = ?cfg.service.database, "entity store ready");

    let system = Arc::new(System::from_config(&cfg, store, &Registry::builtin())?);
    debug!(?system, "system assembled");

    let token = install_shutdown_handler();
    run_service(system, args.once, token).await?;
    Ok(())
}

/// Simple dry-run output: service settings and configured components.
fn print_dry_run(cfg: &ConfigFile) {
    let svc = &cfg.service;
    println!("runwarden dry-run");
    println!("  service.watch_root = {}", svc.watch_root.display());
    println!("  service.database = {}", svc.database.display());
    println!("  service.scratch_root = {}", svc.scratch_root().display());
    println!("  service.run_polling_interval = {}s", svc.run_polling_interval);
    println!("  service.job_polling_interval = {}s", svc.job_polling_interval);
    println!("  service.staleness_threshold = {}s", svc.staleness_threshold);
    println!("  service.max_attempts = {}", svc.max_attempts);
    println!();

    println!("submitters ({}):", cfg.submitters.len());
    for sub in &cfg.submitters {
        println!("  - {} ({})", sub.effective_name(), sub.class);
        for job in &sub.jobs {
            println!("      job {} ({})", job.effective_name(), job.class);
        }
    }

    println!("notifiers ({}):", cfg.notifiers.len());
    for notifier in &cfg.notifiers {
        println!("  - {} ({})", notifier.effective_name(), notifier.class);
    }

    debug!("dry-run complete (no execution)");
}
