//! Waker implementation for task wake-up notifications.
//!
//! A task owns one waker for its whole life, so two registrations made by
//! the same task compare equal under [`Waker::will_wake`].

use crate::runtime::queue::ReadyQueue;
use crate::task::TaskId;

use std::sync::Arc;
use std::task::{Wake, Waker};

/// Re-queues its task when woken.
pub(crate) struct TaskWaker {
    id: TaskId,
    queue: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.id);
    }
}

/// Creates a waker that pushes `id` onto `queue` when called.
///
/// # Arguments
/// * `id` - The task to wake
/// * `queue` - Ready queue owned by the poller running the task
pub(crate) fn make_waker(id: TaskId, queue: Arc<ReadyQueue>) -> Waker {
    Waker::from(Arc::new(TaskWaker { id, queue }))
}
