use crate::net::future::AcceptFuture;
use crate::net::tcp_stream::{new_socket, socket_name};
use crate::net::utils::socket_addr_to_raw;
use crate::reactor::event::cvt;
use crate::reactor::file::AsyncFile;
use crate::runtime::Handle;

use libc::{SO_REUSEADDR, SOL_SOCKET, sockaddr, sockaddr_storage, socklen_t};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;

/// Pending connections the kernel queues for a listener.
const BACKLOG: libc::c_int = 1024;

/// A TCP listener that accepts connections without blocking the poller.
///
/// # Example
/// ```ignore
/// let mut listener = TcpListener::bind(&handle, "127.0.0.1:0".parse()?)?;
///
/// loop {
///     let (stream, peer) = listener.accept().await?;
///     handle.spawn(serve(stream, peer));
/// }
/// ```
pub struct TcpListener {
    file: AsyncFile,
}

impl TcpListener {
    /// Binds a listener to an IPv4 or IPv6 address.
    ///
    /// # Arguments
    /// * `handle` - Poller the listener registers with
    /// * `address` - Address to bind to; port `0` picks a free port
    ///
    /// # Returns
    /// A [`TcpListener`] on success, or an I/O error
    pub fn bind(handle: &Handle, address: SocketAddr) -> io::Result<Self> {
        let fd = new_socket(&address)?;

        let enable: libc::c_int = 1;
        cvt(unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                SOL_SOCKET,
                SO_REUSEADDR,
                (&enable as *const libc::c_int).cast(),
                mem::size_of::<libc::c_int>() as socklen_t,
            )
        })?;

        let (raw, length) = socket_addr_to_raw(&address);
        cvt(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&raw as *const sockaddr_storage).cast::<sockaddr>(),
                length,
            )
        })?;

        cvt(unsafe { libc::listen(fd.as_raw_fd(), BACKLOG) })?;

        Ok(Self {
            file: AsyncFile::new(fd, handle)?,
        })
    }

    /// Waits for the next incoming connection.
    ///
    /// # Returns
    /// The accepted [`TcpStream`](crate::net::TcpStream) and the peer's address
    pub fn accept(&mut self) -> AcceptFuture<'_> {
        AcceptFuture::new(&mut self.file)
    }

    /// Returns the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        socket_name(self.file.as_raw_fd(), libc::getsockname)
    }

    pub fn handle(&self) -> &Handle {
        self.file.handle()
    }
}
