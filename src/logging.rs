// src/logging.rs

//! `tracing` subscriber setup.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, which applies one level to everything;
//! 2. `AUTOBUILDER_LOG`, a full `EnvFilter` directive string
//!    (`info`, `autobuilder::engine=debug,warn`, ...);
//! 3. `info`.
//!
//! Diagnostics go to stderr. Stdout carries driver progress lines
//! (`Task build executing on builds/...`) and is kept clean for them.

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "AUTOBUILDER_LOG";

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level)?)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::default().add_directive(LevelFilter::from(level).into()));
    }
    match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives.trim())
            .with_context(|| format!("invalid {LOG_ENV} value {directives:?}")),
        _ => Ok(EnvFilter::new("info")),
    }
}
