//! TLS 1.3 on top of the poller.
//!
//! - [`record`], [`record_layer`]: record framing and the connection state machine
//! - [`cryptor`]: AEAD protection with per-direction sequence numbers
//! - [`messages`], [`extensions`]: handshake message codecs
//! - [`key_schedule`], [`transcript`]: secret derivation and the running hash
//! - [`key_store`], [`signature`]: server identities and Ed25519 CertificateVerify
//! - [`socket`]: [`TlsSocket`] and [`TlsListener`]

pub mod alert;
pub(crate) mod buffer;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod cryptor;
pub mod extensions;
pub(crate) mod handshake;
pub mod key_schedule;
pub mod key_store;
pub mod messages;
pub mod record;
pub mod record_layer;
pub mod signature;
pub mod socket;
pub mod transcript;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cipher::CipherSuite;
pub use config::{ClientConfig, ServerConfig};
pub use cryptor::RecordCryptor;
pub use key_schedule::TrafficSecrets;
pub use key_store::{Identity, KeyStore};
pub use record_layer::{HandshakeState, RecordLayer};
pub use socket::{TlsListener, TlsSocket};

/// Which end of the connection this side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}
