// src/config/model.rs

use indexmap::IndexMap;
use serde::Deserialize;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_concurrent = 4
/// task_command = ["ostbuild", "run-task"]
///
/// [autobuilder]
/// trigger_task = "build"
/// interval_secs = 10800
///
/// [task.resolve]
/// schedule_min_secs = 300
///
/// [task.build]
/// after = ["resolve"]
/// ```
///
/// Task sections are kept in document order; that order is the registration
/// order of the task registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub autobuilder: AutobuilderSection,

    #[serde(default)]
    pub task: IndexMap<String, TaskConfig>,
}

/// A validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub autobuilder: AutobuilderSection,
    pub task: IndexMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        autobuilder: AutobuilderSection,
        task: IndexMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            autobuilder,
            task,
        }
    }

    /// Effective concurrency limit: configured value or the CPU count.
    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent.unwrap_or_else(default_max_concurrent)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Upper bound on simultaneously executing tasks. Defaults to the number
    /// of available CPUs.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Argv prefix used to invoke a task; the task name and the JSON
    /// parameters are appended.
    #[serde(default = "default_task_command")]
    pub task_command: Vec<String>,
}

fn default_task_command() -> Vec<String> {
    vec!["ostbuild".to_string(), "run-task".to_string()]
}

pub fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            task_command: default_task_command(),
        }
    }
}

/// `[autobuilder]` section: knobs for the long-running driver.
#[derive(Debug, Clone, Deserialize)]
pub struct AutobuilderSection {
    /// Task pushed on every periodic trigger.
    #[serde(default = "default_trigger_task")]
    pub trigger_task: String,

    /// Seconds between periodic triggers.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Status JSON written whenever the running/queued set changes.
    #[serde(default = "default_status_file")]
    pub status_file: String,

    /// Optional Unix socket accepting `status`, `build`, `pushtask`.
    #[serde(default)]
    pub socket: Option<String>,
}

fn default_trigger_task() -> String {
    "build".to_string()
}

fn default_interval_secs() -> u64 {
    60 * 60 * 3
}

fn default_status_file() -> String {
    "autobuilder-status.json".to_string()
}

impl Default for AutobuilderSection {
    fn default() -> Self {
        Self {
            trigger_task: default_trigger_task(),
            interval_secs: default_interval_secs(),
            status_file: default_status_file(),
            socket: None,
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Tasks whose successful, change-producing completion triggers this one.
    #[serde(default)]
    pub after: Vec<String>,

    /// Minimum seconds between two executions; 0 disables rate limiting.
    #[serde(default)]
    pub schedule_min_secs: u64,

    /// Keep stdout (merged with stderr) in `output.txt`.
    #[serde(default = "default_true")]
    pub preserve_stdout: bool,

    #[serde(default = "default_retain")]
    pub retain_success: u32,

    #[serde(default = "default_retain")]
    pub retain_failed: u32,

    /// Per-task override of `[config].task_command`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_retain() -> u32 {
    5
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            after: Vec::new(),
            schedule_min_secs: 0,
            preserve_stdout: true,
            retain_success: default_retain(),
            retain_failed: default_retain(),
            command: None,
        }
    }
}

impl TaskConfig {
    /// Effective argv prefix given the global default.
    pub fn effective_command(&self, default_command: &[String]) -> Vec<String> {
        self.command
            .clone()
            .unwrap_or_else(|| default_command.to_vec())
    }
}
