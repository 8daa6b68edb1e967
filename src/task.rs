//! Task identifiers and join handles.
//!
//! # How Tasks Work
//!
//! 1. A future is boxed into a slot of the poller's task slab
//! 2. Its id is pushed onto the ready queue
//! 3. The poller polls it with the task's own waker
//! 4. When the future returns `Poll::Pending`, it goes back into its slot
//! 5. A readiness event or another task wakes it, re-queueing the id
//! 6. When the future completes, or the task is cancelled, the slot is freed
//!
//! ```ignore
//! let handle = poller.handle();
//! let task = handle.spawn(async { 42 });
//!
//! assert_eq!(poller.block_on(task)?, Some(42));
//! ```

use crate::runtime::Handle;
use crate::utils::slab::Key;

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Identifies a task spawned on a poller.
///
/// Ids are never reused while the task they named could still be referenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Key);

impl TaskId {
    /// Id of the future passed to [`Poller::block_on`](crate::Poller::block_on).
    pub(crate) const ROOT: Self = Self(Key::DANGLING);

    pub(crate) fn from_key(key: Key) -> Self {
        Self(key)
    }

    pub(crate) fn key(self) -> Key {
        self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ROOT {
            f.write_str("TaskId(root)")
        } else {
            write!(f, "TaskId({:?})", self.0)
        }
    }
}

struct JoinState<T> {
    output: Option<T>,
    finished: bool,
    waiter: Option<Waker>,
}

/// Marks the task finished when dropped, whether it completed or was cancelled.
struct Completion<T> {
    state: Rc<RefCell<JoinState<T>>>,
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        let waiter = {
            let mut state = self.state.borrow_mut();
            state.finished = true;
            state.waiter.take()
        };

        if let Some(waiter) = waiter {
            waiter.wake();
        }
    }
}

/// Awaitable handle to a spawned task.
///
/// Resolves to `Some(output)` when the task completes and to `None` if it was
/// cancelled first. Dropping the handle does not cancel the task.
pub struct JoinHandle<T> {
    id: TaskId,
    state: Rc<RefCell<JoinState<T>>>,
    handle: Handle,
}

impl<T: 'static> JoinHandle<T> {
    pub(crate) fn spawn<F>(handle: &Handle, future: F) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        let state = Rc::new(RefCell::new(JoinState {
            output: None,
            finished: false,
            waiter: None,
        }));

        let completion = Completion {
            state: state.clone(),
        };

        let id = handle.spawn_boxed(Box::pin(async move {
            let output = future.await;
            completion.state.borrow_mut().output = Some(output);
            drop(completion);
        }));

        Self {
            id,
            state,
            handle: handle.clone(),
        }
    }
}

impl<T> JoinHandle<T> {
    /// Id of the underlying task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    /// Cancels the task. Awaiting the handle afterwards yields `None`.
    pub fn abort(&self) {
        self.handle.cancel(self.id);
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();

        if let Some(output) = state.output.take() {
            return Poll::Ready(Some(output));
        }

        if state.finished {
            return Poll::Ready(None);
        }

        state.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}
