// src/registry/definition.rs

//! Static task definitions.

use std::time::Duration;

use crate::config::model::TaskConfig;
use crate::types::{OutputCapture, TaskName};

/// A named, registered unit of build work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: TaskName,
    /// Tasks whose successful, change-producing completion triggers this one.
    pub after: Vec<TaskName>,
    /// Minimum seconds between two executions; 0 disables rate limiting.
    pub schedule_min_secs: u64,
    pub preserve_stdout: bool,
    pub retain_success: u32,
    pub retain_failed: u32,
    /// Argv prefix; the task name and JSON parameters are appended at spawn.
    pub command: Vec<String>,
}

impl TaskDefinition {
    /// A definition with the same defaults as an empty `[task.<name>]` section.
    pub fn new(name: impl Into<TaskName>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            after: Vec::new(),
            schedule_min_secs: 0,
            preserve_stdout: true,
            retain_success: 5,
            retain_failed: 5,
            command,
        }
    }

    pub fn from_config(name: TaskName, cfg: &TaskConfig, default_command: &[String]) -> Self {
        Self {
            name,
            after: cfg.after.clone(),
            schedule_min_secs: cfg.schedule_min_secs,
            preserve_stdout: cfg.preserve_stdout,
            retain_success: cfg.retain_success,
            retain_failed: cfg.retain_failed,
            command: cfg.effective_command(default_command),
        }
    }

    /// The cool-down window, or `None` when the task is not rate limited.
    pub fn min_reschedule_interval(&self) -> Option<Duration> {
        (self.schedule_min_secs > 0).then(|| Duration::from_secs(self.schedule_min_secs))
    }

    pub fn output_capture(&self) -> OutputCapture {
        OutputCapture::from_preserve_stdout(self.preserve_stdout)
    }
}
