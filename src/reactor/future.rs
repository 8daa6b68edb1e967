//! Byte stream abstraction and the futures built on it.
//!
//! Anything that can move bytes without blocking implements [`Transport`]:
//! descriptor-backed [`AsyncFile`](crate::AsyncFile) and
//! [`TcpStream`](crate::net::TcpStream), or the in-memory
//! [`MemoryTransport`](crate::MemoryTransport). The record layer only ever
//! talks to a `Transport`.
//!
//! # Examples
//!
//! ```ignore
//! use reactls::Transport;
//!
//! async fn echo_once<T: Transport>(io: &mut T) -> std::io::Result<()> {
//!     let mut buffer = [0u8; 1024];
//!     let read = io.read(&mut buffer).await?;
//!     io.write_all(&buffer[..read]).await
//! }
//! ```

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Non-blocking byte stream driven by the poller.
pub trait Transport {
    /// Attempts to read into `buffer`.
    ///
    /// Returns `Poll::Pending` after arranging for the task to be woken once
    /// data may be available. `Ok(0)` means end of stream.
    fn poll_read(&mut self, cx: &mut Context<'_>, buffer: &mut [u8]) -> Poll<io::Result<usize>>;

    /// Attempts to write from `buffer`, returning how many bytes were taken.
    fn poll_write(&mut self, cx: &mut Context<'_>, buffer: &[u8]) -> Poll<io::Result<usize>>;

    /// Reads data into the provided buffer.
    fn read<'a>(&'a mut self, buffer: &'a mut [u8]) -> ReadFuture<'a, Self>
    where
        Self: Sized,
    {
        ReadFuture { io: self, buffer }
    }

    /// Writes data from the provided buffer.
    fn write<'a>(&'a mut self, buffer: &'a [u8]) -> WriteFuture<'a, Self>
    where
        Self: Sized,
    {
        WriteFuture { io: self, buffer }
    }

    /// Writes the entire buffer, retrying until complete.
    fn write_all<'a>(&'a mut self, buffer: &'a [u8]) -> impl Future<Output = io::Result<()>> + 'a
    where
        Self: Sized,
    {
        async move {
            let mut buffer = buffer;

            while !buffer.is_empty() {
                let written = self.write(buffer).await?;

                if written == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned zero bytes",
                    ));
                }

                buffer = &buffer[written..];
            }

            Ok(())
        }
    }
}

/// Future returned by [`Transport::read`]. Resolves to the number of bytes
/// read, `0` at end of stream.
pub struct ReadFuture<'a, T> {
    io: &'a mut T,
    buffer: &'a mut [u8],
}

impl<T: Transport> Future for ReadFuture<'_, T> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.io.poll_read(cx, this.buffer)
    }
}

/// Future returned by [`Transport::write`]. Resolves to the number of bytes
/// written.
pub struct WriteFuture<'a, T> {
    io: &'a mut T,
    buffer: &'a [u8],
}

impl<T: Transport> Future for WriteFuture<'_, T> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.io.poll_write(cx, this.buffer)
    }
}
