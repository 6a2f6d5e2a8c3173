use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::channel::Task;

/// FIFO of tasks that must never overlap, e.g. everything issued against one native session.
///
/// At most one worker drains a lane at a time; `scheduled` is true while a worker (or an inline
/// caller) owns it.
pub(crate) struct SerialLane {
    id: u64,
    queue: Mutex<LaneQueue>,
}

#[derive(Default)]
struct LaneQueue {
    tasks: VecDeque<Box<dyn Task>>,
    scheduled: bool,
}

impl SerialLane {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            queue: Mutex::new(LaneQueue::default()),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, LaneQueue> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append a task. Returns true when the lane was idle and the caller must schedule it.
    pub(crate) fn push(&self, task: Box<dyn Task>) -> bool {
        let mut queue = self.lock();
        queue.tasks.push_back(task);
        if queue.scheduled {
            false
        } else {
            queue.scheduled = true;
            true
        }
    }

    /// Pop the next task, or mark the lane idle when nothing is left.
    pub(crate) fn next(&self) -> Option<Box<dyn Task>> {
        let mut queue = self.lock();
        let task = queue.tasks.pop_front();
        if task.is_none() {
            queue.scheduled = false;
        }
        task
    }

    /// Take ownership of an idle, empty lane so the caller can run work inline.
    pub(crate) fn claim_idle(&self) -> bool {
        let mut queue = self.lock();
        if queue.scheduled || !queue.tasks.is_empty() {
            false
        } else {
            queue.scheduled = true;
            true
        }
    }

    /// Give up an inline claim. Returns true when tasks arrived meanwhile and the lane must be
    /// scheduled on a worker.
    pub(crate) fn release_claim(&self) -> bool {
        let mut queue = self.lock();
        if queue.tasks.is_empty() {
            queue.scheduled = false;
            false
        } else {
            true
        }
    }

    /// Remove every queued task and mark the lane idle.
    pub(crate) fn drain(&self) -> Vec<Box<dyn Task>> {
        let mut queue = self.lock();
        queue.scheduled = false;
        queue.tasks.drain(..).collect()
    }
}

impl std::fmt::Debug for SerialLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.lock();
        f.debug_struct("SerialLane")
            .field("id", &self.id)
            .field("queued", &queue.tasks.len())
            .field("scheduled", &queue.scheduled)
            .finish()
    }
}
