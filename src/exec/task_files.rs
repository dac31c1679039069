// src/exec/task_files.rs

//! Files shared between the runner and a task process, all inside the
//! task's scratch directory.
//!
//! - `meta.json`: written by the runner before spawn and after exit.
//! - `modified.json`: optional, written by the task (`{"modified": bool}`).
//! - `status.txt`: optional one-line human status written by the task.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::errors::{AutobuilderError, Result};
use crate::fs::write_json_atomic;

pub const META_FILE: &str = "meta.json";
pub const MODIFIED_FILE: &str = "modified.json";
pub const STATUS_FILE: &str = "status.txt";

/// Current `taskMetaVersion`.
pub const TASK_META_VERSION: u32 = 0;

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMeta {
    pub task_meta_version: u32,
    /// Build directory, relative to the workdir.
    pub build_path: String,
    pub complete: bool,
    /// Task directory, relative to the workdir.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TaskMeta {
    /// The record written before the process is spawned.
    pub fn started(build_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            task_meta_version: TASK_META_VERSION,
            build_path: build_path.into(),
            complete: false,
            path: path.into(),
            success: None,
            errmsg: None,
            elapsed_millis: None,
            status: None,
        }
    }

    pub fn completed(
        self,
        success: bool,
        errmsg: Option<String>,
        elapsed_millis: u64,
        status: Option<String>,
    ) -> Self {
        Self {
            complete: true,
            success: Some(success),
            errmsg,
            elapsed_millis: Some(elapsed_millis),
            status,
            ..self
        }
    }

    pub fn load(task_dir: &Path) -> Result<Self> {
        let path = task_dir.join(META_FILE);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn write(&self, task_dir: &Path) -> Result<()> {
        write_json_atomic(&task_dir.join(META_FILE), self)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ModifiedReport {
    #[serde(default = "reported_changed")]
    modified: bool,
}

fn reported_changed() -> bool {
    true
}

/// Whether the task reported a change.
///
/// A missing `modified.json`, or one without a `modified` key, counts as
/// changed; an unreadable or malformed one is an error.
pub fn read_change_report(task_dir: &Path) -> Result<bool> {
    let path = task_dir.join(MODIFIED_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(malformed(path, e.to_string())),
    };

    let report: ModifiedReport =
        serde_json::from_str(&contents).map_err(|e| malformed(path, e.to_string()))?;
    Ok(report.modified)
}

/// The task's status line, with trailing spaces and newlines removed.
pub fn read_status_line(task_dir: &Path) -> Result<Option<String>> {
    let path = task_dir.join(STATUS_FILE);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(
            contents.trim_end_matches([' ', '\n']).to_string(),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn malformed(path: PathBuf, reason: String) -> AutobuilderError {
    AutobuilderError::MalformedTaskFile { path, reason }
}
