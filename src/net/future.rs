//! Futures for accepting and establishing TCP connections.

use crate::net::tcp_stream::TcpStream;
use crate::net::utils::raw_to_socket_addr;
use crate::reactor::Direction;
use crate::reactor::event::cvt;
use crate::reactor::file::AsyncFile;

use libc::{SO_ERROR, SOL_SOCKET, getpeername, getsockopt, sockaddr, sockaddr_storage, socklen_t};
use std::future::Future;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Resolves to the next connection queued on a listening socket.
pub struct AcceptFuture<'a> {
    listener: &'a mut AsyncFile,
}

impl<'a> AcceptFuture<'a> {
    pub(crate) fn new(listener: &'a mut AsyncFile) -> Self {
        Self { listener }
    }
}

impl Future for AcceptFuture<'_> {
    type Output = io::Result<(TcpStream, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let handle = this.listener.handle().clone();

        let accepted = this.listener.poll_io(cx, Direction::Read, |fd| {
            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

            let client = accept_cloexec(fd, &mut storage, &mut length)?;
            Ok((client, storage))
        });

        match accepted {
            Poll::Ready(Ok((client, storage))) => {
                let peer = raw_to_socket_addr(&storage)?;
                Poll::Ready(Ok((TcpStream::from_fd(client, &handle)?, peer)))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Accepts one connection as a non-blocking, close-on-exec descriptor.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn accept_cloexec(fd: RawFd, storage: &mut sockaddr_storage, length: &mut socklen_t) -> io::Result<OwnedFd> {
    let client = cvt(unsafe {
        libc::accept4(
            fd,
            (storage as *mut sockaddr_storage).cast::<sockaddr>(),
            length,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    })?;

    Ok(unsafe { OwnedFd::from_raw_fd(client) })
}

/// Accepts one connection as a close-on-exec descriptor.
///
/// Without `accept4` the flag is set right after `accept`; `AsyncFile`
/// makes the descriptor non-blocking.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn accept_cloexec(fd: RawFd, storage: &mut sockaddr_storage, length: &mut socklen_t) -> io::Result<OwnedFd> {
    let client = cvt(unsafe { libc::accept(fd, (storage as *mut sockaddr_storage).cast::<sockaddr>(), length) })?;
    let client = unsafe { OwnedFd::from_raw_fd(client) };
    cvt(unsafe { libc::fcntl(client.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;

    Ok(client)
}

/// Completes a non-blocking `connect` once the socket turns writable.
pub struct ConnectFuture {
    stream: Option<TcpStream>,
    waiting: bool,
}

impl ConnectFuture {
    pub(crate) fn new(stream: TcpStream, in_progress: bool) -> Self {
        Self {
            stream: Some(stream),
            waiting: in_progress,
        }
    }
}

impl Future for ConnectFuture {
    type Output = io::Result<TcpStream>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(Err(io::Error::other("connect polled after completion")));
        };

        if this.waiting {
            let fd = stream.file().as_raw_fd();

            let mut error: libc::c_int = 0;
            let mut length = mem::size_of::<libc::c_int>() as socklen_t;
            cvt(unsafe {
                getsockopt(fd, SOL_SOCKET, SO_ERROR, (&mut error as *mut libc::c_int).cast(), &mut length)
            })?;

            if error != 0 {
                return Poll::Ready(Err(io::Error::from_raw_os_error(error)));
            }

            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;
            let connected = cvt(unsafe {
                getpeername(fd, (&mut storage as *mut sockaddr_storage).cast::<sockaddr>(), &mut length)
            });

            match connected {
                Ok(_) => this.waiting = false,
                Err(err) if err.raw_os_error() == Some(libc::ENOTCONN) => {
                    stream.file_mut().arm(cx, Direction::Write)?;
                    return Poll::Pending;
                }
                Err(err) => return Poll::Ready(Err(err)),
            }
        }

        match this.stream.take() {
            Some(stream) => Poll::Ready(Ok(stream)),
            None => Poll::Ready(Err(io::Error::other("connect polled after completion"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tcp_listener::TcpListener;
    use crate::runtime::Poller;

    #[test]
    fn accepted_streams_are_close_on_exec() {
        let mut poller = Poller::new().unwrap();
        let handle = poller.handle();

        let mut listener = TcpListener::bind(&handle, "127.0.0.1:0".parse().unwrap()).unwrap();
        let _peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let (stream, _) = poller.block_on(listener.accept()).unwrap().unwrap();
        let fd = stream.file().as_raw_fd();

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert!(flags & libc::FD_CLOEXEC != 0);

        let status = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        assert!(status & libc::O_NONBLOCK != 0);
    }
}
