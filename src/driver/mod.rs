// src/driver/mod.rs

//! Front-ends that feed the scheduler.
//!
//! - [`autobuilder`]: long-running daemon triggering builds periodically.
//! - [`make`]: batch mode running one task (plus cascades) to completion.
//! - [`command_socket`]: line-oriented Unix socket for the daemon.
//! - [`status`]: status file and status line shared by the drivers.

pub mod autobuilder;
pub mod command_socket;
pub mod make;
pub mod status;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{
    CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, SchedulerEvent, SchedulerHandle,
    SchedulerOptions, TaskScheduler,
};
use crate::errors::Result;
use crate::exec::RealExecutorBackend;
use crate::fs::Workdir;
use crate::registry::TaskRegistry;

/// A running scheduler: runtime loop, executor and the driver's ends of the
/// channels.
#[derive(Debug)]
pub struct Engine {
    pub handle: SchedulerHandle,
    pub events: mpsc::UnboundedReceiver<SchedulerEvent>,
    pub runtime: JoinHandle<Result<()>>,
    pub cancel: CancellationToken,
}

impl Engine {
    /// Start the runtime loop and the process executor on the current Tokio
    /// runtime.
    pub fn start(
        registry: Arc<TaskRegistry>,
        workdir: Workdir,
        scheduler_options: SchedulerOptions,
        runtime_options: RuntimeOptions,
    ) -> Self {
        let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
        let (obs_tx, obs_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let executor = RealExecutorBackend::new(rt_tx.clone(), workdir.clone(), cancel.clone());
        let core = CoreRuntime::new(
            TaskScheduler::new(registry, scheduler_options),
            runtime_options,
        );
        let runtime = Runtime::new(core, rt_rx, &rt_tx, executor, workdir)
            .with_observer(obs_tx)
            .with_cancellation(cancel.clone());

        Self {
            handle: SchedulerHandle::new(rt_tx),
            events: obs_rx,
            runtime: tokio::spawn(runtime.run()),
            cancel,
        }
    }
}

/// Ask the runtime to stop on Ctrl-C.
pub fn shutdown_on_ctrl_c(handle: SchedulerHandle) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        let _ = handle.shutdown().await;
    });
}
