//! TLS 1.3 handshake drivers.
//!
//! Both drivers run the full (EC)DHE handshake over a [`RecordLayer`]:
//! X25519 key exchange, Ed25519 server authentication and no client
//! certificates. On success the layer is left in
//! [`HandshakeState::ApplicationData`](crate::tls::HandshakeState) with the
//! application traffic keys installed; on failure it is `Failed` and the
//! matching alert has been offered to the peer.

mod client;
mod server;

pub(crate) use client::client_handshake;
pub(crate) use server::server_handshake;

use crate::error::{Error, Result};
use crate::reactor::Transport;
use crate::tls::alert::AlertDescription;
use crate::tls::messages::HandshakeMessage;
use crate::tls::record_layer::RecordLayer;

use tracing::trace;
use x25519_dalek::{PublicKey, StaticSecret};

/// Reads and decodes the next handshake message.
///
/// The raw bytes are returned too since the transcript hashes the message
/// exactly as it was received.
async fn receive<T: Transport>(layer: &mut RecordLayer<T>) -> Result<(HandshakeMessage, Vec<u8>)> {
    let raw = layer.next_handshake_message().await?;
    let message = HandshakeMessage::decode(&raw)?;

    trace!(message = ?message.handshake_type(), length = raw.len(), "handshake message received");
    Ok((message, raw))
}

fn unexpected(reason: &'static str) -> Error {
    Error::handshake(AlertDescription::UnexpectedMessage, reason)
}

/// X25519 shared secret with the peer's key share.
///
/// All-zero results (small order peer points) are refused.
fn x25519_shared_secret(secret: &StaticSecret, peer_public: &[u8]) -> Result<[u8; 32]> {
    let peer: [u8; 32] = peer_public.try_into().map_err(|_| {
        Error::handshake(AlertDescription::IllegalParameter, "X25519 key share is not 32 bytes")
    })?;

    let shared = secret.diffie_hellman(&PublicKey::from(peer));
    if !shared.was_contributory() {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "X25519 key share is a small order point",
        ));
    }

    Ok(shared.to_bytes())
}
