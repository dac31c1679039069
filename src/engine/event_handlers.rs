// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::Result;

use super::scheduler::TaskScheduler;
use super::{ScheduledTask, SchedulerEvent, TaskName, TaskOutcome, TaskParameters, TaskState};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Atomically point `tasks/<task>` at `build_path`.
    SetTaskBuildPath { task: TaskName, build_path: PathBuf },
    /// Atomically point `results/tasks/<task>` at `build_path`.
    RecordCompleted { task: TaskName, build_path: PathBuf },
    /// Deliver `ScheduledTimerFired { task }` after `delay`.
    ArmTimer { task: TaskName, delay: Duration },
    /// Send this task to the executor.
    Dispatch(ScheduledTask),
    /// Forward an event to the observer.
    Emit(SchedulerEvent),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn stop() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: false,
        }
    }

    pub fn reports_queue_empty(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, CoreCommand::Emit(SchedulerEvent::QueueEmpty)))
    }
}

/// Handle a push request from a driver.
///
/// The result goes back through `reply` when present; rejected pushes never
/// stop the runtime.
pub fn handle_push_task(
    scheduler: &mut TaskScheduler,
    build_path: PathBuf,
    task: TaskName,
    parameters: TaskParameters,
    reply: Option<oneshot::Sender<Result<()>>>,
    now: Instant,
) -> CoreStep {
    let (commands, result) = match scheduler.push_task(&build_path, &task, parameters, now) {
        Ok(commands) => (commands, Ok(())),
        Err(err) => (Vec::new(), Err(err)),
    };

    match reply {
        Some(reply) => {
            if reply.send(result).is_err() {
                debug!(task = %task, "push requester went away before the reply");
            }
        }
        None => {
            if let Err(err) = result {
                warn!(task = %task, error = %err, "rejected task push");
            }
        }
    }

    CoreStep::running(commands)
}

/// Handle a rate-limit timer firing.
pub fn handle_timer_fired(scheduler: &mut TaskScheduler, task: TaskName, now: Instant) -> CoreStep {
    scheduler.fire_scheduled(&task, now);
    CoreStep::running(Vec::new())
}

/// Handle a task completion event.
///
/// Errors here are scheduler invariant violations and are fatal to the
/// runtime.
pub fn handle_task_completion(
    scheduler: &mut TaskScheduler,
    run_id: u64,
    task: TaskName,
    outcome: TaskOutcome,
    now: Instant,
) -> Result<CoreStep> {
    let commands = scheduler.complete(run_id, &task, outcome, now)?;
    Ok(CoreStep::running(commands))
}

/// Answer a snapshot request.
pub fn handle_snapshot(scheduler: &TaskScheduler, reply: oneshot::Sender<Vec<TaskState>>) {
    if reply.send(scheduler.task_state()).is_err() {
        debug!("snapshot requester went away before the reply");
    }
}
