// src/driver/autobuilder.rs

//! The long-running daemon.
//!
//! Allocates a new build version and pushes the trigger task every
//! `interval_secs` (and once at startup), mirrors completions into
//! `results/successful` / `results/failed`, drops build versions whose
//! `resolve` found nothing new and keeps the status file current.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::AutobuilderSection;
use crate::engine::{SchedulerEvent, SchedulerHandle, TaskOutcome, TaskParameters};
use crate::fs::{Workdir, atomic_symlink_swap};
use crate::versioned::VersionedDir;

use super::Engine;
use super::command_socket;
use super::status::StatusTracker;

/// Task whose "no change" result makes the fresh build version redundant.
const RESOLVE_TASK: &str = "resolve";

/// Pushes work onto build versions. Shared by the daemon loop and the
/// command socket.
#[derive(Debug, Clone)]
pub struct BuildTrigger {
    handle: SchedulerHandle,
    builds: Arc<Mutex<VersionedDir>>,
    trigger_task: String,
}

impl BuildTrigger {
    pub fn new(handle: SchedulerHandle, builds: VersionedDir, trigger_task: impl Into<String>) -> Self {
        Self {
            handle,
            builds: Arc::new(Mutex::new(builds)),
            trigger_task: trigger_task.into(),
        }
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    /// Allocate a build version and push the trigger task onto it.
    ///
    /// Returns `false` when the trigger task is already queued or running.
    /// The build directory lock is held from the busy check through the push,
    /// so concurrent triggers allocate at most one version.
    pub async fn trigger_build(&self) -> Result<bool> {
        let task = self.trigger_task.as_str();
        let mut builds = self.builds.lock().await;

        if self.handle.is_task_queued(task).await? || self.handle.is_task_executing(task).await? {
            info!(task = %task, "build already queued; not triggering");
            return Ok(false);
        }

        let build_path = builds.allocate_new_version()?;
        info!(task = %task, build = %build_path.display(), "triggering build");
        if let Err(err) = self
            .handle
            .push_task(build_path, task, TaskParameters::new())
            .await
        {
            if let Err(cleanup) = builds.delete_current_version() {
                warn!(error = %cleanup, "failed to remove unused build version");
            }
            return Err(err.into());
        }
        Ok(true)
    }

    /// Push `task` onto the current build version.
    pub async fn push_on_current(&self, task: &str, parameters: TaskParameters) -> Result<()> {
        let mut builds = self.builds.lock().await;
        let current = builds
            .current_version()?
            .context("no build version allocated yet")?;
        let build_path = builds.create_path_for_version(&current);
        self.handle.push_task(build_path, task, parameters).await?;
        Ok(())
    }

    /// Delete the newest build version.
    pub async fn discard_current_version(&self) -> Result<()> {
        self.builds.lock().await.delete_current_version()?;
        Ok(())
    }
}

/// Run the daemon until the runtime stops. Returns `true` on a clean exit.
pub async fn run(workdir: Workdir, section: &AutobuilderSection, engine: Engine) -> Result<bool> {
    let Engine {
        handle,
        mut events,
        mut runtime,
        cancel,
    } = engine;

    let builds = VersionedDir::open(workdir.root().join("builds"))?;
    let trigger = BuildTrigger::new(handle.clone(), builds, section.trigger_task.clone());
    let mut status = StatusTracker::new(workdir.root().join(&section.status_file));

    let _socket = match &section.socket {
        Some(path) => Some(command_socket::spawn(
            workdir.root().join(path),
            trigger.clone(),
            cancel.clone(),
        )?),
        None => None,
    };

    let mut interval = tokio::time::interval(Duration::from_secs(section.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        workdir = %workdir.root().display(),
        interval_secs = section.interval_secs,
        "autobuilder started"
    );

    let outcome = loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = trigger.trigger_build().await {
                    error!(error = %err, "failed to trigger build");
                }
                refresh_status(&handle, &mut status).await;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    // Observer closed: the runtime is on its way out.
                    break (&mut runtime).await.context("scheduler runtime panicked")?;
                };
                on_scheduler_event(&workdir, &trigger, event).await;
                refresh_status(&handle, &mut status).await;
            }
            joined = &mut runtime => {
                break joined.context("scheduler runtime panicked")?;
            }
        }
    };

    cancel.cancel();
    match outcome {
        Ok(()) => {
            info!("autobuilder stopped");
            Ok(true)
        }
        Err(err) => Err(err.into()),
    }
}

async fn on_scheduler_event(workdir: &Workdir, trigger: &BuildTrigger, event: SchedulerEvent) {
    match event {
        SchedulerEvent::TaskExecuting(task) => {
            println!(
                "Task {} executing on {}",
                task.name(),
                workdir.relative_name(&task.build_path)
            );
        }
        SchedulerEvent::TaskComplete { task, outcome } => {
            let build_name = workdir.relative_name(&task.build_path);

            if task.name() == RESOLVE_TASK && outcome == (TaskOutcome::Success { changed: false }) {
                println!("Resolve is unchanged");
                if let Err(err) = trigger.discard_current_version().await {
                    warn!(error = %err, "failed to delete unchanged build version");
                }
            }

            let results_link: PathBuf = if outcome.is_success() {
                println!("Task {} complete: {}", task.name(), build_name);
                workdir.results_path().join("successful")
            } else {
                println!("Task {} failed: {}", task.name(), build_name);
                workdir.results_path().join("failed")
            };

            if !task.build_path.exists() {
                return;
            }
            if let Err(err) = atomic_symlink_swap(&results_link, &task.build_path) {
                warn!(link = %results_link.display(), error = %err, "failed to update results link");
            }
        }
        SchedulerEvent::QueueEmpty => {}
    }
}

async fn refresh_status(handle: &SchedulerHandle, status: &mut StatusTracker) {
    let state = match handle.task_state().await {
        Ok(state) => state,
        Err(err) => {
            warn!(error = %err, "could not read scheduler state");
            return;
        }
    };
    match status.update(&state) {
        Ok(Some(line)) => println!("{line}"),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "failed to write status file"),
    }
}
