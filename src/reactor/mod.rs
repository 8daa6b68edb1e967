//! Event-driven I/O reactor module.
//!
//! - [`core`]: descriptor table and readiness dispatch
//! - [`poller`]: epoll / kqueue backends
//! - [`event`]: readiness events and libc helpers
//! - [`future`]: the [`Transport`] trait with its read/write futures
//! - [`file`]: [`AsyncFile`], a descriptor registered with the poller
//! - [`memory`]: [`MemoryTransport`], an in-process transport pair

pub(crate) mod core;
pub(crate) mod event;
pub mod file;
pub mod future;
pub mod memory;
mod poller;

pub use file::AsyncFile;
pub use future::{ReadFuture, Transport, WriteFuture};
pub use memory::MemoryTransport;

/// Direction a task waits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Read => 0,
            Self::Write => 1,
        }
    }
}
