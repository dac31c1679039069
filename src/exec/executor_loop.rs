// src/exec/executor_loop.rs

//! Main executor loop that manages running task processes.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{RuntimeEvent, ScheduledTask};
use crate::exec::task_runner::run_task;
use crate::fs::Workdir;

/// Internal handle for a running task process.
struct ActiveTask {
    name: String,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` uses to hand over
/// dispatched tasks. Each task runs in its own Tokio task with a child of
/// `cancel`; cancelling the parent kills every running process and
/// suppresses their completion events.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    workdir: Workdir,
    cancel: CancellationToken,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<u64, ActiveTask> = HashMap::new();

        while let Some(task) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());
            handle_scheduled_task(task, &mut active, &runtime_tx, &workdir, &cancel);
        }

        for (run_id, task) in active.drain() {
            if !task.handle.is_finished() {
                debug!(task = %task.name, run_id, "executor closing with task still running");
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Handle a newly dispatched task.
fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<u64, ActiveTask>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    workdir: &Workdir,
    cancel: &CancellationToken,
) {
    let name = task.name().to_string();
    let run_id = task.run_id;

    if active.values().any(|t| t.name == name) {
        // The scheduler never dispatches a name twice; keep going but make
        // the anomaly visible.
        warn!(task = %name, run_id, "task dispatched while another instance is running");
    }

    let rt_tx = runtime_tx.clone();
    let workdir = workdir.clone();
    let token = cancel.child_token();
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_task(task, workdir, rt_tx, token).await;
        debug!(task = %spawn_name, run_id, "task runner future finished");
    });

    active.insert(run_id, ActiveTask { name, handle });
}
