//! Single-threaded event loop driving tasks and descriptor readiness.
//!
//! One loop iteration runs every task queued so far (a batch), then blocks in
//! the readiness backend until a descriptor a task waits on is ready. Tasks
//! woken by other tasks skip the blocking wait.

use crate::builder::PollerBuilder;
use crate::error::{Error, Result};
use crate::reactor::core::Reactor;
use crate::runtime::Handle;
use crate::runtime::waker::make_waker;
use crate::task::{JoinHandle, TaskId};

use std::future::Future;
use std::io;
use std::pin::pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tracing::{debug, trace};

/// Lifecycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not inside [`Poller::run`] or [`Poller::block_on`].
    Idle,
    /// Dispatching readiness and polling tasks.
    Running,
    /// [`Handle::stop`] was called; the loop returns after the current batch.
    Stopping,
}

/// Main event loop.
///
/// All tasks and descriptors of a poller belong to the thread that created
/// it. Wakers may be cloned freely but must be woken from that thread.
pub struct Poller {
    handle: Handle,
}

impl Poller {
    /// Creates a poller with the default configuration.
    ///
    /// # Example
    /// ```ignore
    /// let mut poller = Poller::new()?;
    /// ```
    pub fn new() -> io::Result<Self> {
        PollerBuilder::new().build()
    }

    pub(crate) fn with_capacity(event_capacity: usize) -> io::Result<Self> {
        let reactor = Reactor::new(event_capacity)?;

        Ok(Self {
            handle: Handle::new(reactor),
        })
    }

    /// Returns a handle that can spawn tasks and register descriptors.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Spawns a task; see [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.handle.spawn(future)
    }

    /// Requests the loop to stop; see [`Handle::stop`].
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn state(&self) -> LoopState {
        self.handle.state()
    }

    /// Runs until every task has finished or [`Handle::stop`] is called.
    ///
    /// # Errors
    /// Fails if the readiness backend fails, if the poller is already running,
    /// or if every remaining task is suspended with nothing left that could
    /// wake it.
    pub fn run(&mut self) -> Result<()> {
        self.enter()?;
        let result = self.run_until_stopped();
        self.handle.shared.state.set(LoopState::Idle);

        result
    }

    fn run_until_stopped(&mut self) -> Result<()> {
        loop {
            for id in self.handle.shared.queue.take_batch() {
                if id != TaskId::ROOT {
                    self.poll_task(id);
                }
            }

            if self.handle.state() == LoopState::Stopping {
                debug!("poller stopped");
                return Ok(());
            }

            if self.handle.task_count() == 0 {
                debug!("no tasks left, poller returning");
                return Ok(());
            }

            self.turn()?;
        }
    }

    /// Drives `future` to completion on this poller, running spawned tasks
    /// along the way.
    ///
    /// # Arguments
    /// * `future` - The future to execute and wait for completion
    ///
    /// # Returns
    /// The output value of the completed future
    ///
    /// # Example
    /// ```ignore
    /// let result = poller.block_on(async { 42 })?;
    /// assert_eq!(result, 42);
    /// ```
    pub fn block_on<F: Future>(&mut self, future: F) -> Result<F::Output> {
        self.enter()?;
        let result = self.block_on_inner(future);
        self.handle.shared.state.set(LoopState::Idle);

        result
    }

    fn block_on_inner<F: Future>(&mut self, future: F) -> Result<F::Output> {
        let mut future = pin!(future);
        let queue = self.handle.shared.queue.clone();
        let waker = make_waker(TaskId::ROOT, queue.clone());
        let mut cx = Context::from_waker(&waker);

        queue.push(TaskId::ROOT);

        loop {
            let batch = queue.take_batch();

            for (position, id) in batch.iter().enumerate() {
                if *id != TaskId::ROOT {
                    self.poll_task(*id);
                    continue;
                }

                if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                    queue.requeue(&batch[position + 1..]);
                    return Ok(output);
                }
            }

            if self.handle.state() == LoopState::Stopping {
                return Err(Error::Contract("poller stopped before the future completed"));
            }

            self.turn()?;
        }
    }

    fn enter(&self) -> Result<()> {
        let state = &self.handle.shared.state;
        if state.get() != LoopState::Idle {
            return Err(Error::Contract("poller is already running"));
        }

        state.set(LoopState::Running);
        Ok(())
    }

    fn poll_task(&self, id: TaskId) {
        let tasks = &self.handle.shared.tasks;

        let (future, waker) = {
            let mut tasks = tasks.borrow_mut();
            match tasks.get_mut(id.key()) {
                Some(slot) => (slot.future.take(), slot.waker.clone()),
                None => return,
            }
        };

        let Some(mut future) = future else {
            return;
        };

        let mut cx = Context::from_waker(&waker);

        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                let slot = tasks.borrow_mut().remove(id.key());
                drop(slot);
                drop(future);
                trace!(task = ?id, "task finished");
            }
            Poll::Pending => {
                // The task may have cancelled itself while it was running.
                let orphan = match tasks.borrow_mut().get_mut(id.key()) {
                    Some(slot) => {
                        slot.future = Some(future);
                        None
                    }
                    None => Some(future),
                };
                drop(orphan);
            }
        }
    }

    /// Waits for readiness and wakes the tasks it concerns.
    fn turn(&self) -> Result<()> {
        let shared = &self.handle.shared;

        let timeout = if shared.queue.is_empty() {
            if !shared.reactor.borrow().has_waiters() {
                return Err(Error::Contract(
                    "every task is suspended and no descriptor can wake one",
                ));
            }
            None
        } else {
            Some(Duration::ZERO)
        };

        let wakers = {
            let mut reactor = shared.reactor.borrow_mut();
            reactor.poll(timeout)?;
            reactor.take_ready()
        };

        for waker in wakers {
            waker.wake();
        }

        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}
