//! Cloneable reference to a running [`Poller`](crate::Poller).
//!
//! Everything that needs the event loop (spawning, descriptor interest,
//! cancellation) goes through a [`Handle`] that is passed explicitly. There is
//! no thread-local "current poller".

use crate::error::Result;
use crate::reactor::Direction;
use crate::reactor::core::Reactor;
use crate::runtime::LoopState;
use crate::runtime::queue::ReadyQueue;
use crate::runtime::waker::make_waker;
use crate::task::{JoinHandle, TaskId};
use crate::utils::slab::Slab;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;

use tracing::{debug, trace};

pub(crate) type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// A spawned task. `future` is `None` while the task is being polled.
pub(crate) struct TaskSlot {
    pub(crate) future: Option<LocalFuture>,
    pub(crate) waker: Waker,
}

pub(crate) struct Shared {
    pub(crate) reactor: RefCell<Reactor>,
    pub(crate) tasks: RefCell<Slab<TaskSlot>>,
    pub(crate) queue: Arc<ReadyQueue>,
    pub(crate) state: Cell<LoopState>,
}

/// Handle to the poller that owns the tasks and descriptors of this thread.
///
/// # Example
/// ```ignore
/// let mut poller = Poller::new()?;
/// let handle = poller.handle();
///
/// poller.block_on(async move {
///     let task = handle.spawn(async { 21 * 2 });
///     assert_eq!(task.await, Some(42));
/// })?;
/// ```
#[derive(Clone)]
pub struct Handle {
    pub(crate) shared: Rc<Shared>,
}

impl Handle {
    pub(crate) fn new(reactor: Reactor) -> Self {
        Self {
            shared: Rc::new(Shared {
                reactor: RefCell::new(reactor),
                tasks: RefCell::new(Slab::new()),
                queue: Arc::new(ReadyQueue::new()),
                state: Cell::new(LoopState::Idle),
            }),
        }
    }

    /// Spawns a task on the poller.
    ///
    /// The task is first polled in the next batch the poller runs. Dropping
    /// the returned [`JoinHandle`] detaches the task.
    ///
    /// # Arguments
    /// * `future` - The future to run as a task
    ///
    /// # Returns
    /// A [`JoinHandle`] resolving to the task output, or `None` if the task
    /// was cancelled first
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        JoinHandle::spawn(self, future)
    }

    pub(crate) fn spawn_boxed(&self, future: LocalFuture) -> TaskId {
        let id = {
            let mut tasks = self.shared.tasks.borrow_mut();
            let key = tasks.insert(TaskSlot {
                future: Some(future),
                waker: Waker::noop().clone(),
            });

            let id = TaskId::from_key(key);
            if let Some(slot) = tasks.get_mut(key) {
                slot.waker = make_waker(id, self.shared.queue.clone());
            }
            id
        };

        self.shared.queue.push(id);
        trace!(task = ?id, "task spawned");

        id
    }

    /// Destroys a task. Its future is dropped right away, or right after the
    /// current poll if the task is cancelling itself.
    ///
    /// # Returns
    /// `false` if the task had already finished or been cancelled
    pub fn cancel(&self, id: TaskId) -> bool {
        let slot = self.shared.tasks.borrow_mut().remove(id.key());

        match slot {
            Some(slot) => {
                drop(slot);
                trace!(task = ?id, "task cancelled");
                true
            }
            None => false,
        }
    }

    /// Asks the poller to return once the current batch has been drained.
    pub fn stop(&self) {
        if self.shared.state.get() == LoopState::Running {
            debug!("poller stop requested");
            self.shared.state.set(LoopState::Stopping);
        }
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.shared.state.get()
    }

    /// Number of tasks that have been spawned and not yet finished.
    pub fn task_count(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    /// Number of descriptors the readiness backend is watching.
    pub fn registered_descriptors(&self) -> usize {
        self.shared.reactor.borrow().registered()
    }

    pub(crate) fn register(&self, fd: RawFd, direction: Direction, waker: &Waker) -> Result<()> {
        self.shared.reactor.borrow_mut().register(fd, direction, waker)
    }

    pub(crate) fn clear_interest(&self, fd: RawFd, direction: Direction) {
        self.shared.reactor.borrow_mut().clear(fd, direction);
    }

    pub(crate) fn deregister(&self, fd: RawFd) {
        self.shared.reactor.borrow_mut().deregister(fd);
    }

    /// Drops every task. Used when the poller goes away so the task futures
    /// (which hold handles themselves) do not keep the shared state alive.
    pub(crate) fn shutdown(&self) {
        loop {
            let slots = self.shared.tasks.borrow_mut().drain();
            if slots.is_empty() {
                break;
            }
            drop(slots);
        }
    }
}
