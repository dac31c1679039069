use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use autobuilder::engine::{RuntimeEvent, ScheduledTask, TaskOutcome};
use autobuilder::errors::Result;
use autobuilder::exec::ExecutorBackend;

type OutcomeFn = dyn Fn(&ScheduledTask) -> Option<TaskOutcome> + Send + Sync;

/// A fake executor that:
/// - records every dispatched task
/// - reports `TaskCompleted` with whatever `outcome_for` returns; `None`
///   leaves the task running until the test completes it by hand.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    dispatched: Arc<Mutex<Vec<ScheduledTask>>>,
    outcome_for: Arc<OutcomeFn>,
}

impl FakeExecutor {
    /// Every task succeeds and reports a change.
    pub fn succeeding(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self::with_outcomes(runtime_tx, |_| Some(TaskOutcome::Success { changed: true }))
    }

    /// Nothing completes on its own.
    pub fn manual(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self::with_outcomes(runtime_tx, |_| None)
    }

    pub fn with_outcomes(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        outcome_for: impl Fn(&ScheduledTask) -> Option<TaskOutcome> + Send + Sync + 'static,
    ) -> Self {
        Self {
            runtime_tx,
            dispatched: Arc::new(Mutex::new(Vec::new())),
            outcome_for: Arc::new(outcome_for),
        }
    }

    /// Shared log of dispatched tasks, in dispatch order.
    pub fn dispatched(&self) -> Arc<Mutex<Vec<ScheduledTask>>> {
        Arc::clone(&self.dispatched)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_task(
        &mut self,
        task: ScheduledTask,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);
        let outcome = (self.outcome_for)(&task);

        Box::pin(async move {
            dispatched.lock().unwrap().push(task.clone());

            if let Some(outcome) = outcome {
                // Deliver from a separate task so the runtime is never
                // blocked on its own channel.
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            run_id: task.run_id,
                            task: task.name().to_string(),
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}

/// Names of the recorded tasks, in dispatch order.
pub fn dispatched_names(log: &Arc<Mutex<Vec<ScheduledTask>>>) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|t| t.name().to_string())
        .collect()
}
