//! FIFO of tasks that were woken and wait for their next poll.
//!
//! Wakers must be `Send + Sync`, so the queue sits behind a mutex even though
//! only the poller thread ever drains it.

use crate::task::TaskId;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskId>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a woken task at the back of the queue.
    pub(crate) fn push(&self, id: TaskId) {
        self.lock().push_back(id);
    }

    /// Takes every task queued so far. Tasks woken while the batch runs land
    /// in the next batch.
    pub(crate) fn take_batch(&self) -> Vec<TaskId> {
        self.lock().drain(..).collect()
    }

    /// Puts unprocessed ids back in front of anything queued since.
    pub(crate) fn requeue(&self, ids: &[TaskId]) {
        let mut queue = self.lock();
        for id in ids.iter().rev() {
            queue.push_front(*id);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
