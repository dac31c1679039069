// src/lib.rs

pub mod cli;
pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod registry;
pub mod types;
pub mod versioned;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::loader::{default_config_path, load_and_validate};
use crate::driver::Engine;
use crate::driver::make::MakeRequest;
use crate::engine::{RuntimeOptions, SchedulerOptions};
use crate::fs::Workdir;
use crate::registry::TaskRegistry;
use crate::types::parse_parameters;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workdir checks and config loading
/// - the task registry
/// - scheduler runtime + process executor
/// - the selected driver (`autobuilder` daemon or `make`)
/// - Ctrl-C handling
///
/// Returns `Ok(false)` when the driver finished but some task failed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let workdir_root = PathBuf::from(&args.workdir);
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_path(&workdir_root));

    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let registry = Arc::new(TaskRegistry::from_config(&cfg)?);

    if args.dry_run {
        print_dry_run(&config_path, &cfg, &registry);
        return Ok(true);
    }

    Workdir::check_is_work_directory(&workdir_root)?;
    let workdir = Workdir::open(&workdir_root)?;
    info!(workdir = %workdir.root().display(), tasks = registry.len(), "workdir ready");

    match args.command.unwrap_or(Command::Autobuilder) {
        Command::Autobuilder => {
            let options = SchedulerOptions::default().with_max_concurrent(cfg.max_concurrent());
            let engine = Engine::start(
                registry,
                workdir.clone(),
                options,
                RuntimeOptions::default(),
            );
            driver::shutdown_on_ctrl_c(engine.handle.clone());
            driver::autobuilder::run(workdir, &cfg.autobuilder, engine).await
        }
        Command::Make {
            only,
            skip,
            taskname,
            parameters,
        } => {
            let request = MakeRequest {
                task: taskname,
                parameters: parse_parameters(&parameters)?,
                only,
                skip: skip.into_iter().collect(),
            };
            let engine = Engine::start(
                registry,
                workdir.clone(),
                request.scheduler_options(cfg.max_concurrent()),
                RuntimeOptions {
                    exit_when_idle: true,
                },
            );
            driver::shutdown_on_ctrl_c(engine.handle.clone());
            driver::make::run(&workdir, &request, engine).await
        }
    }
}

/// Simple dry-run output: print the registry in registration order.
fn print_dry_run(config_path: &Path, cfg: &config::ConfigFile, registry: &TaskRegistry) {
    println!("autobuilder dry-run ({})", config_path.display());
    println!("  config.max_concurrent = {}", cfg.max_concurrent());
    println!(
        "  autobuilder.trigger_task = {} (every {}s)",
        cfg.autobuilder.trigger_task, cfg.autobuilder.interval_secs
    );
    println!();

    println!("tasks ({}):", registry.len());
    for def in registry.definitions() {
        println!("  - {}", def.name);
        println!("      command: {:?}", def.command);
        if !def.after.is_empty() {
            println!("      after: {:?}", def.after);
        }
        let triggers = registry.tasks_triggered_after(&def.name);
        if !triggers.is_empty() {
            println!("      triggers: {:?}", triggers);
        }
        if def.schedule_min_secs > 0 {
            println!("      schedule_min_secs: {}", def.schedule_min_secs);
        }
        if !def.preserve_stdout {
            println!("      preserve_stdout: false");
        }
        println!(
            "      retain: success={} failed={}",
            def.retain_success, def.retain_failed
        );
    }

    debug!("dry-run complete (no execution)");
}
