// src/driver/command_socket.rs

//! Line-oriented control socket for the daemon.
//!
//! One command per line, one reply line per command:
//! - `status` -> status JSON
//! - `build` -> `ok` | `already queued`
//! - `pushtask <name> [key=jsonvalue ...]` -> `ok` | `error: ...`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fs::remove_path_if_exists;
use crate::types::parse_parameters;

use super::autobuilder::BuildTrigger;
use super::status::StatusReport;

/// Bind `path` and serve connections until `cancel` fires.
///
/// A stale socket file at `path` is replaced.
pub fn spawn(path: PathBuf, trigger: BuildTrigger, cancel: CancellationToken) -> Result<JoinHandle<()>> {
    remove_path_if_exists(&path)?;
    let listener =
        UnixListener::bind(&path).with_context(|| format!("binding command socket {:?}", path))?;

    info!(socket = %path.display(), "command socket listening");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let trigger = trigger.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, &trigger).await {
                                debug!(error = %err, "command socket connection ended with error");
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "command socket accept failed"),
                },
                _ = cancel.cancelled() => break,
            }
        }
        cleanup(&path);
        info!("command socket stopped");
    }))
}

async fn serve_connection(stream: UnixStream, trigger: &BuildTrigger) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(reply) = execute_command(&line, trigger).await else {
            continue;
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

/// Execute one command line. Blank lines get no reply.
pub async fn execute_command(line: &str, trigger: &BuildTrigger) -> Option<String> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    debug!(command = %command, "command socket request");

    let reply = match command {
        "status" => match trigger.handle().task_state().await {
            Ok(state) => {
                let report = StatusReport::from_task_state(&state).with_system_load();
                serde_json::to_string(&report).unwrap_or_else(|e| format!("error: {e}"))
            }
            Err(e) => format!("error: {e}"),
        },
        "build" => match trigger.trigger_build().await {
            Ok(true) => "ok".to_string(),
            Ok(false) => "already queued".to_string(),
            Err(e) => format!("error: {e:#}"),
        },
        "pushtask" => {
            let Some(task) = words.next() else {
                return Some("error: usage: pushtask <name> [key=jsonvalue ...]".to_string());
            };
            let pairs: Vec<&str> = words.collect();
            let pushed = match parse_parameters(&pairs) {
                Ok(params) => trigger.push_on_current(task, params).await,
                Err(e) => Err(e),
            };
            match pushed {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("error: {e:#}"),
            }
        }
        _ => "error: unknown command".to_string(),
    };
    Some(reply)
}

fn cleanup(path: &Path) {
    if let Err(err) = remove_path_if_exists(path) {
        debug!(error = %err, "failed to remove command socket");
    }
}
