// src/driver/status.rs

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::engine::TaskState;
use crate::fs::write_json_atomic;

const LOADAVG_PATH: &str = "/proc/loadavg";

/// Contents of the status file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub running: Vec<String>,
    pub queued: Vec<String>,
    pub system_load: Vec<String>,
}

impl StatusReport {
    pub fn from_task_state(state: &[TaskState]) -> Self {
        let (running, queued): (Vec<&TaskState>, Vec<&TaskState>) =
            state.iter().partition(|s| s.running);
        Self {
            running: running.into_iter().map(|s| s.name.clone()).collect(),
            queued: queued.into_iter().map(|s| s.name.clone()).collect(),
            system_load: Vec::new(),
        }
    }

    pub fn with_system_load(mut self) -> Self {
        self.system_load = read_system_load();
        self
    }

    /// `[idle]`, or `running: [...]` followed by ` queued: [...]` when
    /// anything is queued.
    pub fn status_line(&self) -> String {
        if self.running.is_empty() && self.queued.is_empty() {
            return "[idle]".to_string();
        }
        let mut line = format!("running: {}", json_list(&self.running));
        if !self.queued.is_empty() {
            line.push_str(&format!(" queued: {}", json_list(&self.queued)));
        }
        line
    }
}

fn json_list(names: &[String]) -> String {
    serde_json::to_string(names).unwrap_or_else(|_| format!("{names:?}"))
}

/// Fields of `/proc/loadavg`; empty where it's unavailable.
pub fn read_system_load() -> Vec<String> {
    match fs::read_to_string(LOADAVG_PATH) {
        Ok(contents) => contents
            .trim_end_matches('\n')
            .split(' ')
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!(error = %e, "system load unavailable");
            Vec::new()
        }
    }
}

/// Writes the status file whenever the status line changes.
#[derive(Debug)]
pub struct StatusTracker {
    path: PathBuf,
    last_line: Option<String>,
}

impl StatusTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_line: None,
        }
    }

    /// Returns the new status line if it changed.
    pub fn update(&mut self, state: &[TaskState]) -> Result<Option<String>> {
        let report = StatusReport::from_task_state(state);
        let line = report.status_line();
        if self.last_line.as_deref() == Some(line.as_str()) {
            return Ok(None);
        }

        write_json_atomic(&self.path, &report.with_system_load())?;
        self.last_line = Some(line.clone());
        Ok(Some(line))
    }
}
