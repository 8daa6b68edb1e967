use crate::reactor::event::{Event, cvt};

use libc::{EV_ADD, EV_CLEAR, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, kevent, kqueue};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

pub(crate) struct Selector {
    kqueue: OwnedFd,
    events: Vec<kevent>,
}

fn change(fd: RawFd, filter: i16, flags: u16) -> kevent {
    let mut event: kevent = unsafe { mem::zeroed() };
    event.ident = fd as usize;
    event.filter = filter as _;
    event.flags = flags as _;
    event
}

impl Selector {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let fd = cvt(unsafe { kqueue() })?;
        let kqueue = unsafe { OwnedFd::from_raw_fd(fd) };

        Ok(Self {
            kqueue,
            events: Vec::with_capacity(capacity.max(1)),
        })
    }

    fn apply(&self, changes: &[kevent]) -> io::Result<()> {
        cvt(unsafe {
            kevent(
                self.kqueue.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as libc::c_int,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        })?;
        Ok(())
    }

    /// Starts watching `fd` for both directions. `EV_CLEAR` gives edge semantics.
    pub(crate) fn add(&self, fd: RawFd) -> io::Result<()> {
        self.apply(&[
            change(fd, EVFILT_READ, EV_ADD | EV_CLEAR),
            change(fd, EVFILT_WRITE, EV_ADD | EV_CLEAR),
        ])
    }

    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        let read = self.apply(&[change(fd, EVFILT_READ, EV_DELETE)]);
        let write = self.apply(&[change(fd, EVFILT_WRITE, EV_DELETE)]);
        read.and(write)
    }

    /// Waits for readiness and appends what was reported to `ready`.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Event>) -> io::Result<()> {
        self.events.clear();

        let timespec = timeout.map(|duration| libc::timespec {
            tv_sec: duration.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = timespec
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const libc::timespec);

        let n = unsafe {
            kevent(
                self.kqueue.as_raw_fd(),
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as libc::c_int,
                timespec_ptr,
            )
        };

        let n = match cvt(n) {
            Ok(n) => n as usize,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(err),
        };

        unsafe { self.events.set_len(n) };

        for raw in &self.events {
            let failed = raw.flags & (EV_EOF | EV_ERROR) != 0;
            let filter = raw.filter;

            ready.push(Event {
                fd: raw.ident as RawFd,
                readable: filter == EVFILT_READ || failed,
                writable: filter == EVFILT_WRITE || failed,
            });
        }

        Ok(())
    }
}
