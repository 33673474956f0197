//! Per-task-list queues of pending task tokens.
//!
//! A queue only ever holds tokens of SCHEDULED tasks. The entry is removed by
//! whoever moves the task out of SCHEDULED, while holding that task's
//! execution lock, so a token can be claimed at most once.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::domain::ExecutionKey;

/// A queued task: its token and the execution owning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub task_token: String,
    pub execution: ExecutionKey,
}

/// FIFO queues keyed by task list name, with a wake-up for long pollers.
#[derive(Debug, Default)]
pub struct TaskQueues {
    lists: Mutex<HashMap<String, VecDeque<PendingTask>>>,
    notify: Notify,
}

impl TaskQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and wake every poller waiting on this set of queues.
    pub fn enqueue(&self, task_list: &str, task: PendingTask) {
        tracing::debug!(task_list, task_token = %task.task_token, "Enqueued task");
        self.lists
            .lock()
            .entry(task_list.to_string())
            .or_default()
            .push_back(task);
        self.notify.notify_waiters();
    }

    /// Oldest pending task of a list, left in place.
    pub fn peek(&self, task_list: &str) -> Option<PendingTask> {
        self.lists
            .lock()
            .get(task_list)
            .and_then(|queue| queue.front().cloned())
    }

    /// Drop a token from a list. Returns whether it was queued.
    pub fn remove(&self, task_list: &str, task_token: &str) -> bool {
        let mut lists = self.lists.lock();
        let Some(queue) = lists.get_mut(task_list) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|task| task.task_token != task_token);
        let removed = queue.len() != before;
        if queue.is_empty() {
            lists.remove(task_list);
        }
        removed
    }

    pub fn contains(&self, task_list: &str, task_token: &str) -> bool {
        self.lists
            .lock()
            .get(task_list)
            .is_some_and(|queue| queue.iter().any(|task| task.task_token == task_token))
    }

    pub fn pending_count(&self, task_list: &str) -> usize {
        self.lists.lock().get(task_list).map_or(0, VecDeque::len)
    }

    /// Names of lists that currently hold at least one task.
    pub fn task_lists(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lists.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Future resolved by the next [`enqueue`](Self::enqueue).
    ///
    /// Create (and enable) it before checking the queues so an enqueue that
    /// lands in between is not missed.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}
