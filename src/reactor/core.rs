use crate::error::{Error, Result};
use crate::reactor::Direction;
use crate::reactor::event::Event;
use crate::reactor::poller::Selector;

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::task::Waker;
use std::time::Duration;

use tracing::{trace, warn};

/// Suspended waiters for one descriptor, at most one per direction.
#[derive(Default)]
struct Interest {
    read: Option<Waker>,
    write: Option<Waker>,
}

impl Interest {
    fn slot(&mut self, direction: Direction) -> &mut Option<Waker> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }
}

/// Descriptor table on top of the OS readiness backend.
///
/// A descriptor is handed to the backend the first time anyone waits on it and
/// stays there until [`Reactor::deregister`]. Readiness is edge-triggered, so
/// waiters always retry their syscall before suspending again.
pub(crate) struct Reactor {
    selector: Selector,
    registry: HashMap<RawFd, Interest>,
    events: Vec<Event>,
    wakers: Vec<Waker>,
}

impl Reactor {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            selector: Selector::new(capacity)?,
            registry: HashMap::new(),
            events: Vec::with_capacity(capacity),
            wakers: Vec::new(),
        })
    }

    /// Suspends `waker` until `fd` becomes ready in `direction`.
    ///
    /// Re-registering with a waker that wakes the same task refreshes the
    /// entry. A different task already waiting in that direction is an error.
    pub(crate) fn register(&mut self, fd: RawFd, direction: Direction, waker: &Waker) -> Result<()> {
        if !self.registry.contains_key(&fd) {
            self.selector.add(fd)?;
            self.registry.insert(fd, Interest::default());
            trace!(fd, "descriptor added to readiness set");
        }

        let Some(interest) = self.registry.get_mut(&fd) else {
            return Err(Error::Contract("descriptor vanished during registration"));
        };

        let slot = interest.slot(direction);
        if slot.as_ref().is_some_and(|existing| !existing.will_wake(waker)) {
            return Err(Error::InterestConflict { fd, direction });
        }

        *slot = Some(waker.clone());
        Ok(())
    }

    /// Drops a waiter without forgetting the descriptor.
    pub(crate) fn clear(&mut self, fd: RawFd, direction: Direction) {
        if let Some(interest) = self.registry.get_mut(&fd) {
            interest.slot(direction).take();
        }
    }

    /// Forgets `fd`. Pending waiters are dropped without being woken.
    pub(crate) fn deregister(&mut self, fd: RawFd) {
        if self.registry.remove(&fd).is_none() {
            return;
        }

        if let Err(err) = self.selector.delete(fd) {
            warn!(fd, error = %err, "failed to remove descriptor from readiness set");
        }

        trace!(fd, "descriptor removed from readiness set");
    }

    /// Number of descriptors currently known to the backend.
    pub(crate) fn registered(&self) -> usize {
        self.registry.len()
    }

    /// Whether any task is suspended on a descriptor.
    pub(crate) fn has_waiters(&self) -> bool {
        self.registry
            .values()
            .any(|interest| interest.read.is_some() || interest.write.is_some())
    }

    /// Blocks for at most `timeout` and queues the wakers of every ready waiter.
    pub(crate) fn poll(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.events.clear();
        self.selector.wait(timeout, &mut self.events)?;
        self.handle_events();

        Ok(())
    }

    fn handle_events(&mut self) {
        for event in self.events.drain(..) {
            let Some(interest) = self.registry.get_mut(&event.fd) else {
                continue;
            };

            if event.readable {
                self.wakers.extend(interest.read.take());
            }

            if event.writable {
                self.wakers.extend(interest.write.take());
            }
        }
    }

    /// Hands out the wakers collected by the last [`Reactor::poll`].
    /// The caller wakes them once the reactor is no longer borrowed.
    pub(crate) fn take_ready(&mut self) -> Vec<Waker> {
        std::mem::take(&mut self.wakers)
    }
}
