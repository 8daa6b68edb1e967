//! Running hash over the handshake messages.
//!
//! The ClientHello arrives before the cipher suite (and therefore the hash)
//! is known, so messages are kept verbatim until [`Transcript::select`].

use crate::error::{Error, Result};
use crate::tls::cipher::HashAlgorithm;

use sha2::{Digest, Sha256, Sha384};

enum State {
    Buffering(Vec<u8>),
    Sha256(Sha256),
    Sha384(Sha384),
}

pub struct Transcript {
    state: State,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            state: State::Buffering(Vec::new()),
        }
    }

    /// Fixes the hash function and feeds it everything buffered so far.
    pub fn select(&mut self, hash: HashAlgorithm) -> Result<()> {
        let State::Buffering(buffered) = &self.state else {
            return Err(Error::Contract("transcript hash already selected"));
        };

        self.state = match hash {
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new_with_prefix(buffered)),
            HashAlgorithm::Sha384 => State::Sha384(Sha384::new_with_prefix(buffered)),
        };

        Ok(())
    }

    /// Appends a full handshake message, header included.
    pub fn add(&mut self, message: &[u8]) {
        match &mut self.state {
            State::Buffering(buffered) => buffered.extend_from_slice(message),
            State::Sha256(hasher) => hasher.update(message),
            State::Sha384(hasher) => hasher.update(message),
        }
    }

    /// Hash of every message added so far.
    pub fn current_hash(&self) -> Result<Vec<u8>> {
        match &self.state {
            State::Buffering(_) => Err(Error::Contract("transcript hash not selected")),
            State::Sha256(hasher) => Ok(hasher.clone().finalize().to_vec()),
            State::Sha384(hasher) => Ok(hasher.clone().finalize().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_messages_are_hashed_after_selection() {
        let mut transcript = Transcript::new();
        transcript.add(b"client hello");
        assert!(transcript.current_hash().is_err());

        transcript.select(HashAlgorithm::Sha384).unwrap();
        transcript.add(b"server hello");

        assert_eq!(
            transcript.current_hash().unwrap(),
            HashAlgorithm::Sha384.digest(b"client helloserver hello")
        );
        assert!(transcript.select(HashAlgorithm::Sha256).is_err());
    }
}
