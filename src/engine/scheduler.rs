// src/engine/scheduler.rs

//! Pure task scheduler.
//!
//! Owns the pending queue, the executing set, the rate-limit table and the
//! build path last assigned to each task. Every operation returns the
//! [`CoreCommand`]s the IO shell must carry out (symlink updates, timers,
//! dispatches, observer notifications); nothing here touches the
//! filesystem, spawns processes or reads the clock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::model::default_max_concurrent;
use crate::errors::{AutobuilderError, Result};
use crate::registry::TaskRegistry;

use super::event_handlers::CoreCommand;
use super::queue::{PendingQueue, PushOutcome};
use super::rate_limit::{Admission, RateLimitTable};
use super::{
    ScheduledTask, SchedulerEvent, TaskData, TaskName, TaskOutcome, TaskParameters, TaskState,
};

/// Knobs of a scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Global cap on simultaneously executing tasks.
    pub max_concurrent: usize,
    /// Enqueue successors when a task succeeds with `changed = true`.
    pub process_after: bool,
    /// Successors never enqueued by cascades.
    pub skip: HashSet<TaskName>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            process_after: true,
            skip: HashSet::new(),
        }
    }
}

impl SchedulerOptions {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }
}

#[derive(Debug)]
pub struct TaskScheduler {
    registry: Arc<TaskRegistry>,
    options: SchedulerOptions,
    pending: PendingQueue,
    executing: Vec<ScheduledTask>,
    rate_limits: RateLimitTable,
    build_paths: HashMap<TaskName, PathBuf>,
    next_run_id: u64,
    recalculate_queued: bool,
}

impl TaskScheduler {
    pub fn new(registry: Arc<TaskRegistry>, options: SchedulerOptions) -> Self {
        Self {
            registry,
            options,
            pending: PendingQueue::new(),
            executing: Vec::new(),
            rate_limits: RateLimitTable::new(),
            build_paths: HashMap::new(),
            next_run_id: 1,
            recalculate_queued: false,
        }
    }

    /// Point `task` at `build_path` and request it.
    ///
    /// The name is resolved before any state changes: an unknown name fails
    /// with [`AutobuilderError::UnknownTask`] and leaves the scheduler
    /// untouched.
    pub fn push_task(
        &mut self,
        build_path: &Path,
        task: &str,
        parameters: TaskParameters,
        now: Instant,
    ) -> Result<Vec<CoreCommand>> {
        let definition = self.registry.definition(task)?.clone();
        let mut commands = Vec::new();

        self.assign_build_path(task, build_path, &mut commands);
        self.request(TaskData::new(definition, parameters), now, &mut commands);

        Ok(commands)
    }

    /// The rate-limit timer for `task` elapsed.
    pub fn fire_scheduled(&mut self, task: &str, now: Instant) {
        match self.rate_limits.fire(task, now) {
            Some(data) => {
                info!(task = %task, "cool-down elapsed; enqueueing deferred task");
                self.enqueue(data);
            }
            None => {
                warn!(task = %task, "rate-limit timer fired without a deferred request");
            }
        }
    }

    /// Whether a recalculation was requested since the last one ran.
    pub fn recalculate_queued(&self) -> bool {
        self.recalculate_queued
    }

    /// Run the queued recalculation, if any.
    pub fn flush(&mut self) -> Vec<CoreCommand> {
        if self.recalculate_queued {
            self.recalculate()
        } else {
            Vec::new()
        }
    }

    /// Dispatch as many pending tasks as the concurrency budget allows.
    ///
    /// Emits `QueueEmpty` when nothing is pending, executing or deferred.
    pub fn recalculate(&mut self) -> Vec<CoreCommand> {
        self.recalculate_queued = false;
        let mut commands = Vec::new();

        if self.pending.is_empty() && self.executing.is_empty() {
            if !self.rate_limits.has_deferred() {
                debug!("task queue empty");
                commands.push(CoreCommand::Emit(SchedulerEvent::QueueEmpty));
            }
            return commands;
        }

        let executing: HashSet<TaskName> =
            self.executing.iter().map(|t| t.name().to_string()).collect();
        self.pending
            .move_blocked_to_back(|name| executing.contains(name));

        while self.executing.len() < self.options.max_concurrent {
            let runnable = self
                .pending
                .front()
                .is_some_and(|data| !self.is_task_executing(data.name()));
            if !runnable {
                break;
            }
            let Some(data) = self.pending.pop_front() else {
                break;
            };

            let Some(build_path) = self.build_paths.get(data.name()).cloned() else {
                error!(task = %data.name(), "no build path assigned; dropping task");
                continue;
            };

            let task = ScheduledTask {
                run_id: self.next_run_id,
                data,
                build_path,
            };
            self.next_run_id += 1;

            info!(
                task = %task.name(),
                run_id = task.run_id,
                build = %task.build_path.display(),
                executing = self.executing.len() + 1,
                "dispatching task"
            );

            self.executing.push(task.clone());
            commands.push(CoreCommand::Dispatch(task.clone()));
            commands.push(CoreCommand::Emit(SchedulerEvent::TaskExecuting(task)));
        }

        if !self.pending.is_empty() {
            debug!(
                pending = self.pending.len(),
                executing = self.executing.len(),
                "tasks remain pending"
            );
        }

        commands
    }

    /// Record the end of run `run_id`.
    ///
    /// A run id that is not executing means the scheduler's bookkeeping is
    /// broken; that is reported as [`AutobuilderError::ConcurrencyInvariantViolation`].
    pub fn complete(
        &mut self,
        run_id: u64,
        task: &str,
        outcome: TaskOutcome,
        now: Instant,
    ) -> Result<Vec<CoreCommand>> {
        let idx = self
            .executing
            .iter()
            .position(|t| t.run_id == run_id)
            .ok_or_else(|| AutobuilderError::ConcurrencyInvariantViolation {
                task: task.to_string(),
                run_id,
            })?;
        let finished = self.executing.remove(idx);
        let mut commands = Vec::new();

        match &outcome {
            TaskOutcome::Success { changed } => info!(
                task = %finished.name(),
                run_id,
                changed = *changed,
                "task succeeded"
            ),
            TaskOutcome::Failed { error } => warn!(
                task = %finished.name(),
                run_id,
                error = %error,
                "task failed"
            ),
        }

        commands.push(CoreCommand::RecordCompleted {
            task: finished.name().to_string(),
            build_path: finished.build_path.clone(),
        });

        if outcome.cascades() {
            let successors = self
                .registry
                .tasks_triggered_after(finished.name())
                .to_vec();
            for successor in successors {
                self.assign_build_path(&successor, &finished.build_path, &mut commands);

                if !self.options.process_after {
                    debug!(task = %successor, "not processing successors; skipping");
                    continue;
                }
                if self.options.skip.contains(&successor) {
                    info!(task = %successor, "skipping task");
                    continue;
                }

                let definition = self.registry.definition(&successor)?.clone();
                self.request(
                    TaskData::new(definition, TaskParameters::new()),
                    now,
                    &mut commands,
                );
            }
        } else if outcome.is_success() {
            debug!(task = %finished.name(), "no changes; not triggering successors");
        }

        commands.push(CoreCommand::Emit(SchedulerEvent::TaskComplete {
            task: finished,
            outcome,
        }));
        self.recalculate_queued = true;

        Ok(commands)
    }

    /// Name is in the pending queue.
    pub fn is_task_queued(&self, task: &str) -> bool {
        self.pending.contains(task)
    }

    pub fn is_task_executing(&self, task: &str) -> bool {
        self.executing.iter().any(|t| t.name() == task)
    }

    /// Name holds a deferred request waiting for its cool-down.
    pub fn is_task_deferred(&self, task: &str) -> bool {
        self.rate_limits.is_deferred(task)
    }

    /// Nothing pending, executing or deferred.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.executing.is_empty() && !self.rate_limits.has_deferred()
    }

    /// Snapshot: pending entries in queue order, then executing entries
    /// (`running = true`).
    pub fn task_state(&self) -> Vec<TaskState> {
        let queued = self.pending.iter().map(|data| TaskState {
            running: false,
            name: data.name().to_string(),
            parameters: data.parameters.clone(),
            run_id: None,
            build_path: None,
        });
        let running = self.executing.iter().map(|task| TaskState {
            running: true,
            name: task.name().to_string(),
            parameters: task.data.parameters.clone(),
            run_id: Some(task.run_id),
            build_path: Some(task.build_path.clone()),
        });
        queued.chain(running).collect()
    }

    pub fn executing(&self) -> &[ScheduledTask] {
        &self.executing
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Build path currently assigned to `task`.
    pub fn build_path_of(&self, task: &str) -> Option<&Path> {
        self.build_paths.get(task).map(PathBuf::as_path)
    }

    fn assign_build_path(&mut self, task: &str, build_path: &Path, commands: &mut Vec<CoreCommand>) {
        self.build_paths
            .insert(task.to_string(), build_path.to_path_buf());
        commands.push(CoreCommand::SetTaskBuildPath {
            task: task.to_string(),
            build_path: build_path.to_path_buf(),
        });
    }

    /// Route a request through the rate limiter when the task has a
    /// cool-down, otherwise enqueue it directly.
    fn request(&mut self, data: TaskData, now: Instant, commands: &mut Vec<CoreCommand>) {
        let Some(interval) = data.definition.min_reschedule_interval() else {
            self.enqueue(data);
            return;
        };

        let name = data.name().to_string();
        match self.rate_limits.admit(data, interval, now) {
            Admission::Immediate(data) => {
                info!(task = %name, "scheduled task executing immediately");
                self.enqueue(data);
            }
            Admission::Deferred { delay } => {
                info!(
                    task = %name,
                    delay_secs = delay.as_secs(),
                    "scheduled task deferred until cool-down elapses"
                );
                commands.push(CoreCommand::ArmTimer { task: name, delay });
            }
            Admission::Replaced { remaining } => {
                info!(
                    task = %name,
                    remaining_secs = remaining.as_secs(),
                    "task already scheduled; replacing its parameters"
                );
            }
        }
    }

    fn enqueue(&mut self, data: TaskData) {
        if self.pending.push(data) == PushOutcome::Appended {
            debug!(pending = self.pending.len(), "pending queue grew");
        }
        self.recalculate_queued = true;
    }
}
