//! Signal delivery through the poller (Linux `signalfd`).
//!
//! Signals with a handler are blocked for the calling thread and read from a
//! `signalfd` by a task of the processor's own [`TaskGroup`], so handlers run
//! on the poller thread like any other task.

use crate::group::TaskGroup;
use crate::reactor::event::cvt;
use crate::reactor::file::AsyncFile;
use crate::reactor::future::Transport;
use crate::runtime::Handle;

use libc::{SFD_CLOEXEC, SFD_NONBLOCK, SIG_BLOCK, SIG_UNBLOCK, pthread_sigmask, sigset_t};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::ptr;
use std::rc::Rc;

use tracing::{debug, warn};

const SIGINFO_LEN: usize = mem::size_of::<libc::signalfd_siginfo>();

type Handler = Box<dyn FnMut()>;

struct Handlers {
    by_signal: HashMap<i32, Handler>,
}

/// Runs callbacks when signals arrive.
///
/// # Example
/// ```ignore
/// let mut signals = SignalProcessor::new(&handle)?;
/// let stopper = handle.clone();
/// signals.add_handler(libc::SIGTERM, move || stopper.stop())?;
/// ```
pub struct SignalProcessor {
    fd: RawFd,
    mask: sigset_t,
    handlers: Rc<RefCell<Handlers>>,
    _reader: TaskGroup,
}

impl SignalProcessor {
    pub fn new(handle: &Handle) -> io::Result<Self> {
        let mask = empty_set()?;
        let fd = cvt(unsafe { libc::signalfd(-1, &mask, SFD_NONBLOCK | SFD_CLOEXEC) })?;
        let mut file = AsyncFile::new(unsafe { OwnedFd::from_raw_fd(fd) }, handle)?;

        let handlers = Rc::new(RefCell::new(Handlers {
            by_signal: HashMap::new(),
        }));

        let reader = TaskGroup::new(handle);
        let dispatch = handlers.clone();
        reader.spawn(async move {
            let mut info = [0u8; SIGINFO_LEN];

            loop {
                match file.read(&mut info).await {
                    Ok(SIGINFO_LEN) => {}
                    Ok(read) => {
                        warn!(read, "short read from signalfd");
                        continue;
                    }
                    Err(err) => {
                        warn!(error = %err, "signalfd read failed");
                        return;
                    }
                }

                let signal = u32::from_ne_bytes([info[0], info[1], info[2], info[3]]) as i32;
                run_handler(&dispatch, signal);
            }
        });

        Ok(Self {
            fd,
            mask,
            handlers,
            _reader: reader,
        })
    }

    /// Routes `signal` to `handler`, replacing any previous handler for it.
    ///
    /// The signal is blocked for the calling thread so it is only ever
    /// observed through the poller.
    pub fn add_handler(&mut self, signal: i32, handler: impl FnMut() + 'static) -> io::Result<()> {
        cvt(unsafe { libc::sigaddset(&mut self.mask, signal) })?;

        let mut single = empty_set()?;
        cvt(unsafe { libc::sigaddset(&mut single, signal) })?;
        pthread_result(unsafe { pthread_sigmask(SIG_BLOCK, &single, ptr::null_mut()) })?;

        cvt(unsafe { libc::signalfd(self.fd, &self.mask, SFD_NONBLOCK | SFD_CLOEXEC) })?;

        self.handlers
            .borrow_mut()
            .by_signal
            .insert(signal, Box::new(handler));
        debug!(signal, "signal handler installed");

        Ok(())
    }
}

impl Drop for SignalProcessor {
    fn drop(&mut self) {
        let result = pthread_result(unsafe { pthread_sigmask(SIG_UNBLOCK, &self.mask, ptr::null_mut()) });
        if let Err(err) = result {
            warn!(error = %err, "failed to unblock handled signals");
        }
    }
}

/// Calls the handler for `signal` without holding the table borrowed, so a
/// handler may install further handlers.
fn run_handler(handlers: &Rc<RefCell<Handlers>>, signal: i32) {
    let Some(mut handler) = handlers.borrow_mut().by_signal.remove(&signal) else {
        debug!(signal, "signal without handler ignored");
        return;
    };

    handler();

    handlers
        .borrow_mut()
        .by_signal
        .entry(signal)
        .or_insert(handler);
}

fn empty_set() -> io::Result<sigset_t> {
    let mut set: sigset_t = unsafe { mem::zeroed() };
    cvt(unsafe { libc::sigemptyset(&mut set) })?;
    Ok(set)
}

fn pthread_result(code: libc::c_int) -> io::Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(code))
    }
}
