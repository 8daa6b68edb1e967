//! In-process transport pair.
//!
//! Two [`MemoryTransport`] ends share a pair of byte queues. Writes never
//! block; reads suspend until the other end writes or is dropped. An optional
//! chunk limit caps every read and write so callers see the short reads and
//! partial writes a socket would produce.

use crate::reactor::future::Transport;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct Pipe {
    data: VecDeque<u8>,
    reader: Option<Waker>,
    writer_closed: bool,
    reader_closed: bool,
}

/// One end of an in-memory byte stream.
pub struct MemoryTransport {
    incoming: Rc<RefCell<Pipe>>,
    outgoing: Rc<RefCell<Pipe>>,
    max_chunk: usize,
}

impl MemoryTransport {
    /// Creates a connected pair with no chunk limit.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_chunk(usize::MAX)
    }

    /// Creates a connected pair moving at most `max_chunk` bytes per call.
    pub fn pair_with_chunk(max_chunk: usize) -> (Self, Self) {
        let max_chunk = max_chunk.max(1);
        let a_to_b = Rc::new(RefCell::new(Pipe::default()));
        let b_to_a = Rc::new(RefCell::new(Pipe::default()));

        let a = Self {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            max_chunk,
        };
        let b = Self {
            incoming: a_to_b,
            outgoing: b_to_a,
            max_chunk,
        };

        (a, b)
    }

    /// Bytes written by the peer and not read yet.
    pub fn pending(&self) -> usize {
        self.incoming.borrow().data.len()
    }
}

impl Transport for MemoryTransport {
    fn poll_read(&mut self, cx: &mut Context<'_>, buffer: &mut [u8]) -> Poll<io::Result<usize>> {
        let mut pipe = self.incoming.borrow_mut();

        if pipe.data.is_empty() {
            if pipe.writer_closed || buffer.is_empty() {
                return Poll::Ready(Ok(0));
            }

            pipe.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let count = buffer.len().min(self.max_chunk).min(pipe.data.len());
        for (slot, byte) in buffer.iter_mut().zip(pipe.data.drain(..count)) {
            *slot = byte;
        }

        Poll::Ready(Ok(count))
    }

    fn poll_write(&mut self, _cx: &mut Context<'_>, buffer: &[u8]) -> Poll<io::Result<usize>> {
        let (reader, count) = {
            let mut pipe = self.outgoing.borrow_mut();

            if pipe.reader_closed {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "peer transport dropped",
                )));
            }

            let count = buffer.len().min(self.max_chunk);
            pipe.data.extend(&buffer[..count]);

            if count == 0 {
                return Poll::Ready(Ok(0));
            }

            (pipe.reader.take(), count)
        };

        if let Some(reader) = reader {
            reader.wake();
        }

        Poll::Ready(Ok(count))
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.incoming.borrow_mut().reader_closed = true;

        let reader = {
            let mut pipe = self.outgoing.borrow_mut();
            pipe.writer_closed = true;
            pipe.reader.take()
        };

        if let Some(reader) = reader {
            reader.wake();
        }
    }
}
