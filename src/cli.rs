// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `autobuilder`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autobuilder",
    version,
    about = "Continuously resolve, build and test OS trees as a DAG of tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Working directory holding `manifest.json`, `builds/`, `tasks/`, `results/`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub workdir: String,

    /// Path to the task configuration (TOML).
    ///
    /// Default: `Autobuilder.toml` inside the workdir.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AUTOBUILDER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task registry, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Trigger builds periodically and keep running (default).
    Autobuilder,

    /// Execute a single task (and, unless `--only`, whatever runs after it).
    Make {
        /// Don't process tasks after this one.
        #[arg(short = 'n', long)]
        only: bool,

        /// Never auto-trigger this task (may be repeated).
        #[arg(short = 'x', long, value_name = "NAME")]
        skip: Vec<String>,

        /// Task to execute.
        taskname: String,

        /// Parameters as `key=jsonvalue`.
        parameters: Vec<String>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
