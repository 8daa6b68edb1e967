//! Single-threaded cooperative async runtime with a TLS 1.3 stack.
//!
//! One [`Poller`] owns a ready queue of tasks and an edge-triggered
//! epoll/kqueue reactor. Tasks suspend on descriptor readiness and are
//! resumed, always on the poller's thread, once the descriptor is ready.
//! Everything that would block is expressed as a [`Transport`].
//!
//! # Architecture
//!
//! - **Poller**: runs tasks and dispatches readiness until no work is left
//! - **Handle**: cheap clone for spawning and registering descriptors
//! - **AsyncFile / TcpStream**: descriptors driven by the reactor
//! - **RecordLayer**: TLS 1.3 record protection over any transport
//! - **TlsSocket**: client and server handshakes plus encrypted I/O
//!
//! # Example
//! ```ignore
//! let mut poller = Poller::new()?;
//! let handle = poller.handle();
//! let addresses = TlsSocket::resolve("127.0.0.1", 8443)?;
//!
//! poller.block_on(async move {
//!     let config = ClientConfig::default();
//!     let mut socket = TlsSocket::connect(&handle, &addresses, Some("localhost"), &config).await?;
//!     socket.write_all(b"ping").await
//! })??;
//! ```

mod builder;
mod error;
mod group;
pub mod net;
pub mod reactor;
mod runtime;
#[cfg(target_os = "linux")]
mod signal;
mod task;
pub mod tls;
mod utils;

pub use builder::PollerBuilder;
pub use error::{Error, ErrorKind, Result};
pub use group::TaskGroup;
pub use reactor::{AsyncFile, Direction, MemoryTransport, Transport};
pub use runtime::{Handle, LoopState, Poller};
#[cfg(target_os = "linux")]
pub use signal::SignalProcessor;
pub use task::{JoinHandle, TaskId};
pub use tls::{
    CipherSuite, ClientConfig, HandshakeState, Identity, KeyStore, RecordCryptor, RecordLayer, Role, ServerConfig,
    TlsListener, TlsSocket, TrafficSecrets,
};
