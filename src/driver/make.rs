// src/driver/make.rs

//! Batch mode: run one task (plus whatever cascades from it) in
//! `<workdir>/local` and exit once the queue drains.

use std::collections::HashSet;
use std::fs;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{SchedulerEvent, SchedulerOptions, TaskParameters};
use crate::fs::Workdir;
use crate::types::OutputCapture;

use super::Engine;

/// Build directory used by `make`, relative to the workdir.
pub const LOCAL_BUILD_DIR: &str = "local";

const FOLLOW_POLL: Duration = Duration::from_millis(200);

/// What `make` was asked to do.
#[derive(Debug, Clone)]
pub struct MakeRequest {
    pub task: String,
    pub parameters: TaskParameters,
    /// Run only `task`; no cascades. Also streams its output.
    pub only: bool,
    pub skip: HashSet<String>,
}

impl MakeRequest {
    /// Scheduler options this request implies.
    pub fn scheduler_options(&self, max_concurrent: usize) -> SchedulerOptions {
        SchedulerOptions {
            process_after: !self.only,
            skip: self.skip.clone(),
            ..SchedulerOptions::default().with_max_concurrent(max_concurrent)
        }
    }
}

/// `<workdir>/local`, created if needed.
pub fn local_build_path(workdir: &Workdir) -> Result<PathBuf> {
    let path = workdir.root().join(LOCAL_BUILD_DIR);
    fs::create_dir_all(&path).with_context(|| format!("creating {:?}", path))?;
    Ok(path)
}

/// Run `request` to completion. Returns `false` if any task failed.
pub async fn run(workdir: &Workdir, request: &MakeRequest, engine: Engine) -> Result<bool> {
    let Engine {
        handle,
        mut events,
        runtime,
        cancel,
    } = engine;

    let build_path = local_build_path(workdir)?;
    handle
        .push_task(&build_path, &request.task, request.parameters.clone())
        .await?;

    let mut failed = false;
    let mut follower: Option<CancellationToken> = None;

    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::TaskExecuting(task) => {
                println!(
                    "Task {} executing on {}",
                    task.name(),
                    workdir.relative_name(&task.build_path)
                );
                if request.only {
                    let capture = task.data.definition.output_capture();
                    let token = cancel.child_token();
                    tokio::spawn(follow_output(
                        task.task_cwd().join(capture.file_name()),
                        capture,
                        token.clone(),
                    ));
                    follower = Some(token);
                }
            }
            SchedulerEvent::TaskComplete { task, outcome } => {
                if let Some(token) = follower.take() {
                    token.cancel();
                }
                let build_name = workdir.relative_name(&task.build_path);
                match outcome.error() {
                    None => println!("Task {} complete: {}", task.name(), build_name),
                    Some(error) => {
                        failed = true;
                        println!("Task {} failed: {}", task.name(), build_name);
                        info!(task = %task.name(), error = %error, "task failed");
                    }
                }
            }
            SchedulerEvent::QueueEmpty => {
                debug!("all tasks complete");
            }
        }
    }

    runtime.await.context("scheduler runtime panicked")??;
    cancel.cancel();

    if !failed {
        println!("Success!");
    }
    Ok(!failed)
}

/// Copy whatever gets appended to the task's output file to our stdout
/// until `cancel` fires.
async fn follow_output(path: PathBuf, capture: OutputCapture, cancel: CancellationToken) {
    debug!(file = %path.display(), ?capture, "following task output");
    let mut offset = 0u64;
    let mut stdout = tokio::io::stdout();
    let mut buf = Vec::new();

    loop {
        let finished = cancel.is_cancelled();

        if let Ok(mut file) = tokio::fs::File::open(&path).await {
            buf.clear();
            let read = match file.seek(SeekFrom::Start(offset)).await {
                Ok(_) => file.read_to_end(&mut buf).await.ok(),
                Err(_) => None,
            };
            if let Some(n) = read {
                offset += n as u64;
                let _ = stdout.write_all(&buf).await;
                let _ = stdout.flush().await;
            }
        }

        if finished {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(FOLLOW_POLL) => {}
            _ = cancel.cancelled() => {}
        }
    }
}
