//! TCP networking primitives.
//!
//! This module provides non-blocking TCP networking primitives for async I/O:
//! - [`tcp_listener`]: [`TcpListener`] for accepting connections
//! - [`tcp_stream`]: [`TcpStream`] for reading/writing data
//! - [`future`]: accept and connect futures
//! - [`utils`]: address conversion utilities
//!
//! Both IPv4 and IPv6 addresses are supported.

pub mod future;
pub mod tcp_listener;
pub mod tcp_stream;
pub(crate) mod utils;

pub use tcp_listener::TcpListener;
pub use tcp_stream::TcpStream;
