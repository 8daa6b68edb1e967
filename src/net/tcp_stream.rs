use crate::net::future::ConnectFuture;
use crate::net::utils::{raw_to_socket_addr, socket_addr_to_raw};
use crate::reactor::Direction;
use crate::reactor::event::{cvt, cvt_size};
use crate::reactor::file::AsyncFile;
use crate::reactor::future::Transport;
use crate::runtime::Handle;

use libc::{
    AF_INET, AF_INET6, FD_CLOEXEC, F_SETFD, SOCK_STREAM, fcntl, recv, send, sockaddr, sockaddr_storage,
    socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::task::{Context, Poll};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// A connected, non-blocking TCP socket.
pub struct TcpStream {
    file: AsyncFile,
}

impl TcpStream {
    pub(crate) fn from_fd(fd: OwnedFd, handle: &Handle) -> io::Result<Self> {
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        set_no_sigpipe(fd.as_raw_fd())?;

        Ok(Self {
            file: AsyncFile::new(fd, handle)?,
        })
    }

    /// Opens a connection to `address`.
    ///
    /// # Example
    /// ```ignore
    /// let stream = TcpStream::connect(&handle, "127.0.0.1:8443".parse()?).await?;
    /// ```
    pub async fn connect(handle: &Handle, address: SocketAddr) -> io::Result<Self> {
        let fd = new_socket(&address)?;
        let stream = Self::from_fd(fd, handle)?;

        let (raw, length) = socket_addr_to_raw(&address);
        let ret = unsafe {
            libc::connect(
                stream.file.as_raw_fd(),
                (&raw as *const sockaddr_storage).cast::<sockaddr>(),
                length,
            )
        };

        let in_progress = match cvt(ret) {
            Ok(_) => false,
            Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => true,
            Err(err) => return Err(err),
        };

        ConnectFuture::new(stream, in_progress).await
    }

    /// Connects to the first address of `addresses` that accepts.
    pub async fn connect_any(handle: &Handle, addresses: &[SocketAddr]) -> io::Result<Self> {
        let mut last_error = None;

        for address in addresses {
            match Self::connect(handle, *address).await {
                Ok(stream) => return Ok(stream),
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to")
        }))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        socket_name(self.file.as_raw_fd(), libc::getpeername)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        socket_name(self.file.as_raw_fd(), libc::getsockname)
    }

    pub(crate) fn file(&self) -> &AsyncFile {
        &self.file
    }

    pub(crate) fn file_mut(&mut self) -> &mut AsyncFile {
        &mut self.file
    }
}

impl Transport for TcpStream {
    fn poll_read(&mut self, cx: &mut Context<'_>, buffer: &mut [u8]) -> Poll<io::Result<usize>> {
        self.file.poll_io(cx, Direction::Read, |fd| {
            cvt_size(unsafe { recv(fd, buffer.as_mut_ptr().cast(), buffer.len(), 0) })
        })
    }

    fn poll_write(&mut self, cx: &mut Context<'_>, buffer: &[u8]) -> Poll<io::Result<usize>> {
        self.file.poll_io(cx, Direction::Write, |fd| {
            cvt_size(unsafe { send(fd, buffer.as_ptr().cast(), buffer.len(), SEND_FLAGS) })
        })
    }
}

/// Creates a close-on-exec stream socket for the family of `address`.
pub(crate) fn new_socket(address: &SocketAddr) -> io::Result<OwnedFd> {
    let domain = match address {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    };

    let fd = cvt(unsafe { libc::socket(domain, SOCK_STREAM, 0) })?;
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    cvt(unsafe { fcntl(fd.as_raw_fd(), F_SETFD, FD_CLOEXEC) })?;

    Ok(fd)
}

pub(crate) fn socket_name(
    fd: libc::c_int,
    query: unsafe extern "C" fn(libc::c_int, *mut sockaddr, *mut socklen_t) -> libc::c_int,
) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { query(fd, (&mut storage as *mut sockaddr_storage).cast::<sockaddr>(), &mut length) })?;

    raw_to_socket_addr(&storage)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn set_no_sigpipe(fd: libc::c_int) -> io::Result<()> {
    let enable: libc::c_int = 1;
    cvt(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            (&enable as *const libc::c_int).cast(),
            mem::size_of::<libc::c_int>() as socklen_t,
        )
    })?;

    Ok(())
}
