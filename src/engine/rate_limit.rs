// src/engine/rate_limit.rs

//! Per-task cool-down windows for tasks with `schedule_min_secs > 0`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::{TaskData, TaskName};

#[derive(Debug, Default)]
struct ScheduleInfo {
    /// Last time the task was let through.
    last_executed: Option<Instant>,
    /// A request waiting for the window to elapse.
    deferred: Option<TaskData>,
}

/// Decision for a request to run a rate-limited task.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Enqueue now.
    Immediate(TaskData),
    /// Stored as the deferred request; the caller must arm a one-shot timer
    /// for `delay`.
    Deferred { delay: Duration },
    /// A deferred request already existed and its timer is armed; the new
    /// request replaced it.
    Replaced { remaining: Duration },
}

/// Scheduled-timeout table: task name -> last execution + deferred request.
#[derive(Debug, Default)]
pub struct RateLimitTable {
    entries: HashMap<TaskName, ScheduleInfo>,
}

impl RateLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, data: TaskData, interval: Duration, now: Instant) -> Admission {
        let info = self.entries.entry(data.name().to_string()).or_default();

        if info.deferred.is_some() {
            let remaining = info
                .last_executed
                .map(|last| (last + interval).saturating_duration_since(now))
                .unwrap_or_default();
            info.deferred = Some(data);
            return Admission::Replaced { remaining };
        }

        match info.last_executed {
            Some(last) if now.saturating_duration_since(last) < interval => {
                let delay = (last + interval).saturating_duration_since(now);
                info.deferred = Some(data);
                Admission::Deferred { delay }
            }
            _ => {
                info.last_executed = Some(now);
                Admission::Immediate(data)
            }
        }
    }

    /// The timer for `task` fired: record the execution time and hand back
    /// the deferred request.
    pub fn fire(&mut self, task: &str, now: Instant) -> Option<TaskData> {
        let info = self.entries.get_mut(task)?;
        let data = info.deferred.take()?;
        info.last_executed = Some(now);
        Some(data)
    }

    pub fn is_deferred(&self, task: &str) -> bool {
        self.entries
            .get(task)
            .is_some_and(|info| info.deferred.is_some())
    }

    pub fn has_deferred(&self) -> bool {
        self.entries.values().any(|info| info.deferred.is_some())
    }

    /// The deferred request for `task`, if any.
    pub fn deferred(&self, task: &str) -> Option<&TaskData> {
        self.entries.get(task)?.deferred.as_ref()
    }
}
