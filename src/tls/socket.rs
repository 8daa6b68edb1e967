//! Encrypted stream facade over a [`RecordLayer`].

use crate::error::{Error, Result};
use crate::net::{TcpListener, TcpStream};
use crate::reactor::Transport;
use crate::runtime::Handle;
use crate::tls::Role;
use crate::tls::config::{ClientConfig, ServerConfig};
use crate::tls::handshake::{client_handshake, server_handshake};
use crate::tls::key_store::KeyStore;
use crate::tls::record_layer::RecordLayer;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use tracing::debug;

/// A TLS 1.3 connection whose handshake has completed.
///
/// Constructors only return once the handshake succeeded, so every
/// `TlsSocket` carries application data. Any fatal error leaves the socket
/// failed; later calls report a contract error.
///
/// # Example
/// ```ignore
/// let addresses = TlsSocket::resolve("localhost", 8443)?;
///
/// poller.block_on(async {
///     let mut socket = TlsSocket::connect(&handle, &addresses, Some("localhost"), &config).await?;
///     socket.write_all(b"hello").await?;
///
///     let mut reply = [0u8; 64];
///     socket.read(&mut reply).await
/// })??;
/// ```
pub struct TlsSocket<T: Transport = TcpStream> {
    layer: RecordLayer<T>,
}

impl TlsSocket<TcpStream> {
    /// Resolves `hostname` through the system resolver.
    ///
    /// This blocks the calling thread, so call it before entering the poller
    /// and pass the result to [`connect`](Self::connect).
    pub fn resolve(hostname: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let addresses: Vec<SocketAddr> = (hostname, port).to_socket_addrs()?.collect();
        if addresses.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "host name resolved to no address").into());
        }

        Ok(addresses)
    }

    /// Connects over TCP to the first reachable address and runs the client
    /// handshake.
    pub async fn connect(
        handle: &Handle,
        addresses: &[SocketAddr],
        server_name: Option<&str>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect_any(handle, addresses).await?;
        debug!(peer = ?stream.peer_addr().ok(), "tcp connected");

        Self::client(stream, config, server_name).await
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.layer.get_ref().peer_addr()
    }
}

impl<T: Transport> TlsSocket<T> {
    /// Runs the client handshake over an already connected transport.
    pub async fn client(transport: T, config: &ClientConfig, server_name: Option<&str>) -> Result<Self> {
        let mut layer = RecordLayer::new(transport, Role::Client);
        client_handshake(&mut layer, config, server_name).await?;

        Ok(Self { layer })
    }

    /// Runs the server handshake over an accepted transport.
    pub async fn server(transport: T, config: &ServerConfig, key_store: &KeyStore) -> Result<Self> {
        let mut layer = RecordLayer::new(transport, Role::Server);
        server_handshake(&mut layer, config, key_store).await?;

        Ok(Self { layer })
    }

    /// Reads decrypted application data. `Ok(0)` means the peer sent
    /// `close_notify`.
    pub async fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.layer.read(buffer).await
    }

    /// Encrypts and sends all of `data`, returning its length.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.layer.write(data).await
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let written = self.layer.write(data).await?;
        debug_assert_eq!(written, data.len());
        Ok(())
    }

    /// Fills `buffer` completely, failing if the peer closes first.
    pub async fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buffer.len() {
            let read = self.layer.read(&mut buffer[filled..]).await?;
            if read == 0 {
                return Err(Error::peer_closed());
            }
            filled += read;
        }

        Ok(())
    }

    /// Sends `close_notify`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.layer.shutdown().await
    }

    pub async fn update_keys(&mut self, request_peer_update: bool) -> Result<()> {
        self.layer.update_keys(request_peer_update).await
    }

    pub fn record_layer(&self) -> &RecordLayer<T> {
        &self.layer
    }
}

/// Accepts TCP connections and runs the server handshake on each.
///
/// # Example
/// ```ignore
/// let mut listener = TlsListener::bind(&handle, "127.0.0.1:8443".parse()?, ServerConfig::default())?;
///
/// loop {
///     let (socket, peer) = listener.accept(&key_store).await?;
///     handle.spawn(serve(socket, peer));
/// }
/// ```
pub struct TlsListener {
    listener: TcpListener,
    config: ServerConfig,
}

impl TlsListener {
    pub fn bind(handle: &Handle, address: SocketAddr, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(handle, address)?;

        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next connection and completes its handshake.
    ///
    /// The handshake runs inside this call; spawn a task per connection to
    /// overlap handshakes of different clients.
    pub async fn accept(&mut self, key_store: &KeyStore) -> Result<(TlsSocket, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "tcp accepted");

        let socket = TlsSocket::server(stream, &self.config, key_store).await?;
        Ok((socket, peer))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
