// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use super::TaskData;

/// What happened to a task pushed onto the [`PendingQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended at the back.
    Appended,
    /// An entry with the same name was already waiting; its parameters were
    /// replaced and it kept its position.
    Replaced,
}

/// Task instances awaiting dispatch.
///
/// Semantics:
/// - FIFO by insertion order.
/// - At most one entry per task name; a newer push for a waiting name
///   replaces that entry's parameters (latest wins).
/// - Before each dispatch pass the queue is stably partitioned so entries
///   whose name is currently executing move behind everything else. A
///   runnable task is never stuck behind a blocked one.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<TaskData>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|d| d.name() == name)
    }

    pub fn push(&mut self, data: TaskData) -> PushOutcome {
        if let Some(existing) = self.entries.iter_mut().find(|d| d.name() == data.name()) {
            debug!(task = %data.name(), "task already pending; replacing its parameters");
            *existing = data;
            return PushOutcome::Replaced;
        }

        debug!(task = %data.name(), position = self.entries.len(), "task appended to pending queue");
        self.entries.push_back(data);
        PushOutcome::Appended
    }

    pub fn front(&self) -> Option<&TaskData> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<TaskData> {
        self.entries.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskData> {
        self.entries.iter()
    }

    /// Reassemble the queue as runnable-then-blocked, keeping relative order
    /// inside each partition.
    pub fn move_blocked_to_back(&mut self, is_blocked: impl Fn(&str) -> bool) {
        let (blocked, runnable): (VecDeque<TaskData>, VecDeque<TaskData>) =
            self.entries.drain(..).partition(|d| is_blocked(d.name()));

        if !blocked.is_empty() {
            debug!(
                blocked = blocked.len(),
                runnable = runnable.len(),
                "moved pending tasks blocked by a running instance to the back"
            );
        }

        self.entries = runnable;
        self.entries.extend(blocked);
    }
}
