// src/exec/task_runner.rs

//! Individual task process runner.

use std::fs::{self, File};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{RuntimeEvent, ScheduledTask, TaskOutcome};
use crate::fs::{Workdir, remove_path_if_exists};
use crate::types::OutputCapture;

use super::task_files::{self, MODIFIED_FILE, STATUS_FILE, TaskMeta};
use super::{BUILDDIR_ENV, WORKDIR_ENV};

/// Run a single task process and report its outcome to the runtime.
///
/// Exactly one `TaskCompleted` is sent per run, after the final
/// `meta.json` has been written. If `cancel` fires the child is killed and
/// nothing is sent.
pub async fn run_task(
    task: ScheduledTask,
    workdir: Workdir,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
) {
    let task_name = task.name().to_string();
    let run_id = task.run_id;

    let outcome = match run_task_inner(&task, &workdir, &cancel).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => return,
        Err(err) => {
            error!(
                task = %task_name,
                run_id,
                error = %err,
                "task execution error"
            );
            TaskOutcome::Failed {
                error: format!("{err:#}"),
            }
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            run_id,
            task: task_name.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        warn!(task = %task_name, run_id, "runtime gone; completion not delivered");
    }
}

/// Returns `None` when the run was cancelled.
async fn run_task_inner(
    task: &ScheduledTask,
    workdir: &Workdir,
    cancel: &CancellationToken,
) -> Result<Option<TaskOutcome>> {
    let started = Instant::now();

    let build_path = fs::canonicalize(&task.build_path)
        .with_context(|| format!("resolving build path {:?}", task.build_path))?;
    let task_cwd = build_path.join(task.name());
    fs::create_dir_all(&task_cwd).with_context(|| format!("creating {:?}", task_cwd))?;

    remove_path_if_exists(&task_cwd.join(MODIFIED_FILE))?;
    remove_path_if_exists(&task_cwd.join(STATUS_FILE))?;

    let argv = build_argv(task)?;
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(&task_cwd)
        .env(WORKDIR_ENV, workdir.root())
        .env(BUILDDIR_ENV, &build_path)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    attach_output(&mut cmd, &task_cwd, task.data.definition.output_capture())?;

    let meta = TaskMeta::started(
        workdir.relative_name(&build_path),
        workdir.relative_name(&task_cwd),
    );
    meta.write(&task_cwd)?;

    info!(
        task = %task.name(),
        run_id = task.run_id,
        build = %build_path.display(),
        argv = ?argv,
        "starting task process"
    );

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let errmsg = format!("Failed to spawn {argv:?}: {e}");
            finish(task, &task_cwd, meta, false, Some(errmsg.clone()), started)?;
            return Ok(Some(TaskOutcome::Failed { error: errmsg }));
        }
    };

    let status = tokio::select! {
        status = child.wait() => status
            .with_context(|| format!("waiting for process of task '{}'", task.name()))?,
        _ = cancel.cancelled() => {
            info!(
                task = %task.name(),
                run_id = task.run_id,
                "cancellation requested; killing task process"
            );
            if let Err(e) = child.kill().await {
                warn!(
                    task = %task.name(),
                    run_id = task.run_id,
                    error = %e,
                    "failed to kill child process on cancellation"
                );
            }
            return Ok(None);
        }
    };

    let mut errmsg = exit_failure_message(status);
    let mut changed = true;
    if errmsg.is_none() {
        match task_files::read_change_report(&task_cwd) {
            Ok(c) => changed = c,
            Err(e) => errmsg = Some(e.to_string()),
        }
    }
    let success = errmsg.is_none();

    debug!(
        task = %task.name(),
        run_id = task.run_id,
        exit = ?status,
        success,
        changed,
        "task process exited"
    );

    finish(task, &task_cwd, meta, success, errmsg.clone(), started)?;

    Ok(Some(match errmsg {
        None => TaskOutcome::Success { changed },
        Some(error) => TaskOutcome::Failed { error },
    }))
}

/// Argv: command prefix, task name, JSON parameters.
fn build_argv(task: &ScheduledTask) -> Result<Vec<String>> {
    let definition = &task.data.definition;
    if definition.command.is_empty() {
        bail!("task '{}' has an empty command", definition.name);
    }

    let params = serde_json::to_string(&task.data.parameters)
        .context("serializing task parameters")?;

    let mut argv = definition.command.clone();
    argv.push(definition.name.clone());
    argv.push(params);
    Ok(argv)
}

/// Route stdout/stderr into the task directory.
fn attach_output(cmd: &mut Command, task_cwd: &Path, capture: OutputCapture) -> Result<()> {
    let path: PathBuf = task_cwd.join(capture.file_name());
    remove_path_if_exists(&path)?;
    let file = File::create(&path).with_context(|| format!("creating {:?}", path))?;

    match capture {
        OutputCapture::Preserve => {
            let stderr = file
                .try_clone()
                .with_context(|| format!("duplicating handle of {:?}", path))?;
            cmd.stdout(file).stderr(stderr);
        }
        OutputCapture::ErrorsOnly => {
            cmd.stdout(Stdio::null()).stderr(file);
        }
    }
    Ok(())
}

fn exit_failure_message(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    Some(match (status.code(), status.signal()) {
        (Some(code), _) => format!("Child process exited with code {code}"),
        (None, Some(signal)) => format!("Child process killed by signal {signal}"),
        (None, None) => format!("Child process failed: {status}"),
    })
}

fn finish(
    task: &ScheduledTask,
    task_cwd: &Path,
    meta: TaskMeta,
    success: bool,
    errmsg: Option<String>,
    started: Instant,
) -> Result<()> {
    let status = match task_files::read_status_line(task_cwd) {
        Ok(status) => status,
        Err(e) => {
            warn!(task = %task.name(), error = %e, "unreadable status.txt");
            None
        }
    };
    let elapsed_millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
        task = %task.name(),
        run_id = task.run_id,
        success,
        elapsed_millis,
        "task finished"
    );

    meta.completed(success, errmsg, elapsed_millis, status)
        .write(task_cwd)?;
    Ok(())
}
