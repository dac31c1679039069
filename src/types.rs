// src/types.rs

//! Small shared types used across the registry, engine and executor.

use serde_json::{Map, Value};

/// Canonical task name type.
pub type TaskName = String;

/// Parameters attached to a pushed task instance.
///
/// Serialized as a single JSON object argument on the child command line.
pub type TaskParameters = Map<String, Value>;

/// Where a task's stdout/stderr end up inside its scratch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapture {
    /// stdout and stderr merged into `output.txt`.
    Preserve,
    /// stdout discarded, stderr captured to `errors.txt`.
    ErrorsOnly,
}

impl OutputCapture {
    pub fn from_preserve_stdout(preserve: bool) -> Self {
        if preserve {
            OutputCapture::Preserve
        } else {
            OutputCapture::ErrorsOnly
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            OutputCapture::Preserve => "output.txt",
            OutputCapture::ErrorsOnly => "errors.txt",
        }
    }
}

/// Parse `key=jsonvalue` pairs into a parameter object.
///
/// Used by `make` and the command socket's `pushtask`.
pub fn parse_parameters<S: AsRef<str>>(pairs: &[S]) -> anyhow::Result<TaskParameters> {
    let mut params = Map::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let Some((key, raw)) = pair.split_once('=') else {
            anyhow::bail!("Invalid key=value syntax: {pair}");
        };
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("invalid JSON value for '{key}': {e}"))?;
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
