// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the task scheduler (pending queue, executing set, rate limits, cascades)
//! - the main runtime event loop that reacts to:
//!   - pushed tasks (drivers, command socket, timers)
//!   - rate-limit timers firing
//!   - task completion events from the executor
//!   - shutdown requests
//!
//! The pure state machine lives in [`scheduler`] and [`core`]; the async/IO
//! shell is implemented in [`runtime`]. Drivers talk to a running engine
//! through [`SchedulerHandle`].

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::errors::Result;
use crate::registry::TaskDefinition;

pub use crate::types::{TaskName, TaskParameters};

/// A pushed unit of work: a definition plus its parameters.
///
/// Consumed exactly once by a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskData {
    pub definition: TaskDefinition,
    pub parameters: TaskParameters,
}

impl TaskData {
    pub fn new(definition: TaskDefinition, parameters: TaskParameters) -> Self {
        Self {
            definition,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// A task instance the scheduler has handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    /// Unique per dispatch, monotonically increasing.
    pub run_id: u64,
    pub data: TaskData,
    /// Build directory this run works in (target of `tasks/<name>`).
    pub build_path: PathBuf,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        self.data.name()
    }

    /// Scratch directory of this run: `<build_path>/<name>`.
    pub fn task_cwd(&self) -> PathBuf {
        self.build_path.join(self.name())
    }
}

/// Outcome of a task run as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Exit status 0. `changed` is the task's own report from `modified.json`.
    Success { changed: bool },
    /// Non-zero exit, signal, spawn failure or malformed task files.
    Failed { error: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TaskOutcome::Success { .. } => None,
            TaskOutcome::Failed { error } => Some(error),
        }
    }

    /// Successful and reported a change: successors should run.
    pub fn cascades(&self) -> bool {
        matches!(self, TaskOutcome::Success { changed: true })
    }
}

/// Observable scheduler events, delivered to the observer channel given to
/// the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Emitted right after the task was handed to the executor.
    TaskExecuting(ScheduledTask),
    /// Emitted after the task finished and cascades were processed.
    TaskComplete {
        task: ScheduledTask,
        outcome: TaskOutcome,
    },
    /// Nothing pending, executing or deferred.
    QueueEmpty,
}

/// One entry of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskState {
    pub running: bool,
    pub name: TaskName,
    pub parameters: TaskParameters,
    /// Set for running entries only.
    pub run_id: Option<u64>,
    pub build_path: Option<PathBuf>,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Stop the runtime when the scheduler reports its queue empty
    /// (batch mode).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from drivers, timers and the executor.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// Point `task` at `build_path` and enqueue it.
    PushTask {
        build_path: PathBuf,
        task: TaskName,
        parameters: TaskParameters,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// A rate-limit cool-down for `task` has elapsed.
    ScheduledTimerFired { task: TaskName },
    /// A task process finished.
    TaskCompleted {
        run_id: u64,
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// Request a status snapshot.
    Snapshot {
        reply: oneshot::Sender<Vec<TaskState>>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod queue;
pub mod rate_limit;
pub mod runtime;
pub mod scheduler;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::SchedulerHandle;
pub use queue::PendingQueue;
pub use rate_limit::{Admission, RateLimitTable};
pub use runtime::Runtime;
pub use scheduler::{SchedulerOptions, TaskScheduler};
