// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender,
//! so tests can swap in a fake executor.
//!
//! - `RealExecutorBackend` wraps the loop started by [`spawn_executor`] and
//!   forwards dispatched tasks over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that records dispatched
//!   tasks and emits `TaskCompleted` events on demand.

use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{RuntimeEvent, ScheduledTask};
use crate::errors::{AutobuilderError, Result};
use crate::fs::Workdir;

use super::executor_loop::spawn_executor;

/// Trait abstracting how dispatched tasks are executed.
pub trait ExecutorBackend: Send {
    /// Start executing `task`.
    ///
    /// The implementation must eventually deliver exactly one
    /// `RuntimeEvent::TaskCompleted` for `task.run_id`, unless the run is
    /// cancelled.
    fn spawn_task(
        &mut self,
        task: ScheduledTask,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ScheduledTask>,
}

impl RealExecutorBackend {
    /// Spawn the background executor loop, wired to the given runtime event
    /// sender. Running processes are killed when `cancel` fires.
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        workdir: Workdir,
        cancel: CancellationToken,
    ) -> Self {
        let tx = spawn_executor(runtime_tx, workdir, cancel);
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_task(
        &mut self,
        task: ScheduledTask,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(task)
                .await
                .map_err(|e| anyhow!("executor loop is gone; cannot run task '{}'", e.0.name()))?;
            Ok::<(), AutobuilderError>(())
        })
    }
}
