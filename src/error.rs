//! Error types shared by the event loop and the TLS stack.
//!
//! Every fatal condition aborts only the connection (or task) that hit it;
//! the poller itself never fails because one connection did.

use crate::reactor::Direction;
use crate::tls::alert::AlertDescription;

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failure or peer close. The connection is torn down.
    Transport,
    /// Malformed record or handshake structure.
    Decode,
    /// AEAD tag verification failed.
    Authentication,
    /// Unexpected message, unsupported parameters, Finished mismatch or a
    /// fatal alert from the peer.
    HandshakeProtocol,
    /// The caller broke an API contract.
    ProgrammingContract,
}

/// Errors produced by the poller, the record layer and the handshake.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying descriptor failed or the peer closed the stream.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A length or structure field could not be decoded.
    #[error("decode error: {0}")]
    Decode(&'static str),

    /// Record authentication tag did not verify.
    #[error("record authentication failed")]
    Authentication,

    /// The handshake cannot continue.
    #[error("handshake failed ({alert:?}): {reason}")]
    Handshake {
        /// Alert sent to the peer, if the transport still allowed it.
        alert: AlertDescription,
        /// Human readable cause.
        reason: &'static str,
    },

    /// The peer sent a fatal alert.
    #[error("peer sent fatal alert {0:?}")]
    PeerAlert(AlertDescription),

    /// A second task tried to wait on the same descriptor direction.
    #[error("descriptor {fd} already has a waiting task for {direction:?}")]
    InterestConflict {
        /// Descriptor the interest was registered for.
        fd: i32,
        /// Direction that is already taken.
        direction: Direction,
    },

    /// A local certificate could not be generated.
    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    /// API used in a state where it is not allowed.
    #[error("contract violation: {0}")]
    Contract(&'static str),
}

impl Error {
    pub(crate) fn handshake(alert: AlertDescription, reason: &'static str) -> Self {
        Self::Handshake { alert, reason }
    }

    pub(crate) fn peer_closed() -> Self {
        Self::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection",
        ))
    }

    /// Returns the category this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Authentication => ErrorKind::Authentication,
            Self::Handshake { .. } | Self::PeerAlert(_) => ErrorKind::HandshakeProtocol,
            Self::InterestConflict { .. } | Self::Certificate(_) | Self::Contract(_) => {
                ErrorKind::ProgrammingContract
            }
        }
    }

    /// Alert that should be reported to the peer for this error, if any.
    pub(crate) fn alert(&self) -> Option<AlertDescription> {
        match self {
            Self::Decode(_) => Some(AlertDescription::DecodeError),
            Self::Authentication => Some(AlertDescription::BadRecordMac),
            Self::Handshake { alert, .. } => Some(*alert),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Transport(inner) => inner,
            other => io::Error::other(other),
        }
    }
}
