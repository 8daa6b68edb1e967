//! Non-blocking descriptor handle backed by the poller.
//!
//! `AsyncFile` owns a descriptor, switches it to non-blocking mode and turns
//! `EAGAIN` into a suspension registered with the poller. Dropping it
//! deregisters the descriptor before closing it, so no readiness event can
//! reach a task after its file is gone.

use crate::reactor::Direction;
use crate::reactor::event::{cvt_size, set_nonblocking};
use crate::reactor::future::Transport;
use crate::runtime::Handle;

use libc::{read, write};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::task::{Context, Poll};

/// A non-blocking descriptor registered with a [`Poller`](crate::Poller).
///
/// # Example
/// ```ignore
/// let (reader, writer) = pipe()?;
/// let mut reader = AsyncFile::new(reader, &handle)?;
///
/// let mut buffer = [0u8; 64];
/// let read = reader.read(&mut buffer).await?;
/// ```
pub struct AsyncFile {
    fd: OwnedFd,
    handle: Handle,
    armed: [bool; 2],
}

impl AsyncFile {
    /// Takes ownership of `fd` and puts it into non-blocking mode.
    ///
    /// The descriptor is only handed to the readiness backend once a task
    /// first has to wait on it.
    pub fn new(fd: OwnedFd, handle: &Handle) -> io::Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;

        Ok(Self {
            fd,
            handle: handle.clone(),
            armed: [false; 2],
        })
    }

    /// The poller this file is registered with.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `op` until it stops failing with `EINTR`, suspending the task on
    /// `EAGAIN` until the descriptor is ready in `direction`.
    pub(crate) fn poll_io<R>(
        &mut self,
        cx: &mut Context<'_>,
        direction: Direction,
        mut op: impl FnMut(RawFd) -> io::Result<R>,
    ) -> Poll<io::Result<R>> {
        loop {
            match op(self.fd.as_raw_fd()) {
                Ok(value) => {
                    self.disarm(direction);
                    return Poll::Ready(Ok(value));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return match self.arm(cx, direction) {
                        Ok(()) => Poll::Pending,
                        Err(err) => Poll::Ready(Err(err)),
                    };
                }
                Err(err) => {
                    self.disarm(direction);
                    return Poll::Ready(Err(err));
                }
            }
        }
    }

    /// Suspends the current task until the descriptor is ready in `direction`.
    pub(crate) fn arm(&mut self, cx: &mut Context<'_>, direction: Direction) -> io::Result<()> {
        self.handle
            .register(self.fd.as_raw_fd(), direction, cx.waker())?;
        self.armed[direction.index()] = true;

        Ok(())
    }

    fn disarm(&mut self, direction: Direction) {
        if std::mem::take(&mut self.armed[direction.index()]) {
            self.handle.clear_interest(self.fd.as_raw_fd(), direction);
        }
    }
}

impl AsRawFd for AsyncFile {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Transport for AsyncFile {
    fn poll_read(&mut self, cx: &mut Context<'_>, buffer: &mut [u8]) -> Poll<io::Result<usize>> {
        self.poll_io(cx, Direction::Read, |fd| {
            cvt_size(unsafe { read(fd, buffer.as_mut_ptr().cast(), buffer.len()) })
        })
    }

    fn poll_write(&mut self, cx: &mut Context<'_>, buffer: &[u8]) -> Poll<io::Result<usize>> {
        self.poll_io(cx, Direction::Write, |fd| {
            cvt_size(unsafe { write(fd, buffer.as_ptr().cast(), buffer.len()) })
        })
    }
}

impl Drop for AsyncFile {
    fn drop(&mut self) {
        self.handle.deregister(self.fd.as_raw_fd());
    }
}
