// src/exec/mod.rs

//! Process execution layer.
//!
//! This module runs dispatched tasks as child processes using
//! `tokio::process::Command` and reports back to the runtime via
//! `RuntimeEvent::TaskCompleted`.
//!
//! - [`executor_loop`] owns the loop that receives dispatched tasks and
//!   spawns one runner per task.
//! - [`task_runner`] prepares the task directory, runs the process and
//!   collects its result files.
//! - [`task_files`] holds the on-disk records shared with task processes
//!   (`meta.json`, `modified.json`, `status.txt`).
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` used in production, which tests replace with a
//!   fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod task_files;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;

/// Env var carrying the workdir root to task processes.
pub const WORKDIR_ENV: &str = "_OSTBUILD_WORKDIR";

/// Env var carrying the canonical build directory to task processes.
pub const BUILDDIR_ENV: &str = "_OSTBUILD_BUILDDIR";
