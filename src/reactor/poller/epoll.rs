use super::timeout_millis;
use crate::reactor::event::{Event, cvt};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

pub(crate) struct Selector {
    epoll: OwnedFd,
    events: Vec<epoll_event>,
}

impl Selector {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let fd = cvt(unsafe { epoll_create1(EPOLL_CLOEXEC) })?;
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };

        Ok(Self {
            epoll,
            events: Vec::with_capacity(capacity.max(1)),
        })
    }

    /// Starts watching `fd` for both directions, edge-triggered.
    pub(crate) fn add(&self, fd: RawFd) -> io::Result<()> {
        let mut event = epoll_event {
            events: (EPOLLIN | EPOLLOUT | EPOLLRDHUP | EPOLLET) as u32,
            u64: fd as u64,
        };

        cvt(unsafe { epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_ADD, fd, &mut event) })?;
        Ok(())
    }

    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        cvt(unsafe { epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_DEL, fd, ptr::null_mut()) })?;
        Ok(())
    }

    /// Waits for readiness and appends what was reported to `ready`.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Event>) -> io::Result<()> {
        self.events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.capacity() as libc::c_int,
                timeout_millis(timeout),
            )
        };

        let n = match cvt(n) {
            Ok(n) => n as usize,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(err),
        };

        unsafe { self.events.set_len(n) };

        for raw in &self.events {
            let flags = raw.events as libc::c_int;
            let token = raw.u64;
            let closed = flags & (EPOLLHUP | EPOLLERR) != 0;

            ready.push(Event {
                fd: token as RawFd,
                readable: closed || flags & (EPOLLIN | EPOLLRDHUP) != 0,
                writable: closed || flags & EPOLLOUT != 0,
            });
        }

        Ok(())
    }
}
