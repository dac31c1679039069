// src/engine/handle.rs

use std::path::PathBuf;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};

use crate::errors::{AutobuilderError, Result};

use super::{RuntimeEvent, TaskParameters, TaskState};

/// Cloneable client of a running [`Runtime`](super::Runtime).
///
/// Every call is a message to the runtime loop, so answers are consistent
/// with the scheduler state at the moment the message was processed.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl SchedulerHandle {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    /// Point `task` at `build_path` and request it.
    ///
    /// Fails with `UnknownTask` for names the registry does not know.
    pub async fn push_task(
        &self,
        build_path: impl Into<PathBuf>,
        task: &str,
        parameters: TaskParameters,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeEvent::PushTask {
            build_path: build_path.into(),
            task: task.to_string(),
            parameters,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Pending entries in queue order, then executing ones.
    pub async fn task_state(&self) -> Result<Vec<TaskState>> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeEvent::Snapshot { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    /// `task` is waiting in the pending queue.
    pub async fn is_task_queued(&self, task: &str) -> Result<bool> {
        let state = self.task_state().await?;
        Ok(state.iter().any(|s| !s.running && s.name == task))
    }

    pub async fn is_task_executing(&self, task: &str) -> Result<bool> {
        let state = self.task_state().await?;
        Ok(state.iter().any(|s| s.running && s.name == task))
    }

    /// Ask the runtime to stop. A runtime that already stopped is not an
    /// error.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.tx.send(RuntimeEvent::ShutdownRequested).await;
        Ok(())
    }

    async fn send(&self, event: RuntimeEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| stopped())
    }
}

fn stopped() -> AutobuilderError {
    AutobuilderError::Other(anyhow!("scheduler runtime has stopped"))
}
