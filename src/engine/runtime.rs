// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::fs::Workdir;

use super::core::CoreRuntime;
use super::event_handlers::{CoreCommand, CoreStep};
use super::{RuntimeEvent, SchedulerEvent};

/// Drives the task scheduler in response to `RuntimeEvent`s and delegates
/// process execution to an `ExecutorBackend`.
///
/// This is the IO shell around `CoreRuntime`, which holds all scheduling
/// semantics. The shell reads events, updates the workdir symlinks, arms
/// rate-limit timers, dispatches tasks and forwards `SchedulerEvent`s to the
/// observer channel.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by timers; weak so the channel closes once every handle is gone.
    timer_tx: mpsc::WeakSender<RuntimeEvent>,
    executor: E,
    workdir: Workdir,
    observer: Option<mpsc::UnboundedSender<SchedulerEvent>>,
    cancel: CancellationToken,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: &mpsc::Sender<RuntimeEvent>,
        executor: E,
        workdir: Workdir,
    ) -> Self {
        Self {
            core,
            event_rx,
            timer_tx: event_tx.downgrade(),
            executor,
            workdir,
            observer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Forward every `SchedulerEvent` to `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Stop the loop (and the tasks it started) when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Main event loop.
    ///
    /// - Waits for an event, then drains everything already queued.
    /// - Runs at most one scheduler recalculation per wake-up.
    /// - Returns an error only for scheduler invariant violations or a dead
    ///   executor; task failures never end the loop.
    pub async fn run(mut self) -> Result<()> {
        info!(workdir = %self.workdir.root().display(), "autobuilder runtime started");

        let result = self.event_loop().await;

        // Terminate whatever is still executing.
        self.cancel.cancel();

        match &result {
            Ok(()) => info!("runtime exiting"),
            Err(err) => error!(error = %err, "runtime stopped with error"),
        }
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            let event = tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        return Ok(());
                    }
                },
                _ = self.cancel.cancelled() => {
                    info!("runtime cancelled; exiting");
                    return Ok(());
                }
            };

            if !self.handle_event(event).await? {
                return Ok(());
            }

            // Coalesce: everything that arrived in the same tick shares a
            // single recalculation.
            while let Ok(event) = self.event_rx.try_recv() {
                if !self.handle_event(event).await? {
                    return Ok(());
                }
            }

            let step = self.core.flush();
            if !self.execute_step(step).await? {
                return Ok(());
            }
        }
    }

    async fn handle_event(&mut self, event: RuntimeEvent) -> Result<bool> {
        debug!(?event, "runtime received event");
        let step = self.core.step(event, Instant::now())?;
        self.execute_step(step).await
    }

    async fn execute_step(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        if !step.keep_running {
            info!("core requested exit; stopping runtime");
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::SetTaskBuildPath { task, build_path } => {
                if let Err(err) = self.workdir.set_task_build_path(&task, &build_path) {
                    error!(task = %task, error = %err, "failed to update task symlink");
                }
            }
            CoreCommand::RecordCompleted { task, build_path } => {
                if let Err(err) = self.workdir.record_completed(&task, &build_path) {
                    error!(task = %task, error = %err, "failed to update completed-task symlink");
                }
            }
            CoreCommand::ArmTimer { task, delay } => {
                self.arm_timer(task, delay);
            }
            CoreCommand::Dispatch(task) => {
                if self.cancel.is_cancelled() {
                    debug!(task = %task.name(), "runtime cancelled; not dispatching");
                    return Ok(());
                }
                debug!(task = %task.name(), run_id = task.run_id, "spawning task");
                self.executor.spawn_task(task).await?;
            }
            CoreCommand::Emit(event) => {
                let delivered = match &self.observer {
                    Some(observer) => observer.send(event).is_ok(),
                    None => true,
                };
                if !delivered {
                    debug!("scheduler observer dropped");
                    self.observer = None;
                }
            }
        }
        Ok(())
    }

    fn arm_timer(&self, task: String, delay: std::time::Duration) {
        let tx = self.timer_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }
            match tx.upgrade() {
                Some(tx) => {
                    if tx.send(RuntimeEvent::ScheduledTimerFired { task }).await.is_err() {
                        debug!("runtime gone before rate-limit timer fired");
                    }
                }
                None => debug!("runtime gone before rate-limit timer fired"),
            }
        });
    }
}
