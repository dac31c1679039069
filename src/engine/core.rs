// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated scheduler state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from channels,
//! updates symlinks, arms timers and forwards dispatches to the executor.
//!
//! Recalculation is deferred: handlers only mark it as needed and the shell
//! calls [`CoreRuntime::flush`] once it has drained the events that were
//! already waiting. Many state changes in one tick therefore cost a single
//! dispatch pass.

use tokio::time::Instant;
use tracing::info;

use crate::errors::Result;

use super::event_handlers::{
    handle_push_task, handle_snapshot, handle_task_completion, handle_timer_fired, CoreStep,
};
use super::scheduler::TaskScheduler;
use super::{RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// It has no channels and performs no IO; the caller supplies the current
/// instant with every event.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: TaskScheduler,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: TaskScheduler, options: RuntimeOptions) -> Self {
        Self { scheduler, options }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> Result<CoreStep> {
        let step = match event {
            RuntimeEvent::PushTask {
                build_path,
                task,
                parameters,
                reply,
            } => handle_push_task(&mut self.scheduler, build_path, task, parameters, reply, now),
            RuntimeEvent::ScheduledTimerFired { task } => {
                handle_timer_fired(&mut self.scheduler, task, now)
            }
            RuntimeEvent::TaskCompleted {
                run_id,
                task,
                outcome,
            } => handle_task_completion(&mut self.scheduler, run_id, task, outcome, now)?,
            RuntimeEvent::Snapshot { reply } => {
                // Answer with the state after any queued recalculation.
                let step = self.flush();
                handle_snapshot(&self.scheduler, reply);
                step
            }
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested");
                CoreStep::stop()
            }
        };
        Ok(step)
    }

    /// Run the recalculation queued by earlier events.
    ///
    /// In `exit_when_idle` mode a `QueueEmpty` report ends the runtime.
    pub fn flush(&mut self) -> CoreStep {
        let step = CoreStep::running(self.scheduler.flush());
        if self.options.exit_when_idle && step.reports_queue_empty() {
            info!("queue drained; exiting");
            return CoreStep {
                keep_running: false,
                ..step
            };
        }
        step
    }
}
