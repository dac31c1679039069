// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutobuilderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("No task definition matches {0}")]
    UnknownTask(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No build versions allocated")]
    NoVersions,

    #[error("Invalid build version: {0}")]
    InvalidVersion(String),

    /// The scheduler lost track of a runner it dispatched. Never recoverable.
    #[error("Internal error - failed to find completed task {task} (run {run_id})")]
    ConcurrencyInvariantViolation { task: String, run_id: u64 },

    #[error("Malformed task file {path:?}: {reason}")]
    MalformedTaskFile { path: PathBuf, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AutobuilderError>;
