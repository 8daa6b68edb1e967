//! TLS 1.3 key schedule (RFC 8446 section 7.1).
//!
//! ```text
//!             0
//!             |
//!             v
//!     0 ->  HKDF-Extract = Early Secret
//!             |
//!       Derive-Secret(., "derived", "")
//!             v
//!   ECDHE -> HKDF-Extract = Handshake Secret
//!             |
//!             +-> Derive-Secret(., "c hs traffic", CH..SH)
//!             +-> Derive-Secret(., "s hs traffic", CH..SH)
//!             |
//!       Derive-Secret(., "derived", "")
//!             v
//!     0  ->  HKDF-Extract = Master Secret
//!             |
//!             +-> Derive-Secret(., "c ap traffic", CH..server Finished)
//!             +-> Derive-Secret(., "s ap traffic", CH..server Finished)
//! ```
//!
//! Every secret is as long as the suite's hash output, so SHA-384 suites
//! carry 48 byte secrets all the way down.

use crate::error::{Error, Result};
use crate::tls::Role;
use crate::tls::cipher::{CipherSuite, HashAlgorithm, IV_LEN};

/// HKDF-Expand-Label(Secret, Label, Context, Length) with the "tls13 " prefix.
pub fn hkdf_expand_label(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>> {
    let full_label_len = 6 + label.len();
    if full_label_len > 255 || context.len() > 255 || length > u16::MAX as usize {
        return Err(Error::Contract("HKDF label, context or length out of range"));
    }

    let mut info = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
    info.extend_from_slice(&(length as u16).to_be_bytes());
    info.push(full_label_len as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    let mut out = vec![0u8; length];
    hash.expand(secret, &info, &mut out)?;

    Ok(out)
}

/// Derive-Secret(Secret, Label, Messages) given the transcript hash.
pub fn derive_secret(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>> {
    hkdf_expand_label(hash, secret, label, transcript_hash, hash.output_len())
}

/// Record protection key and IV for one traffic secret.
pub fn traffic_key_and_iv(suite: CipherSuite, secret: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN])> {
    let hash = suite.hash();
    let key = hkdf_expand_label(hash, secret, b"key", &[], suite.key_len())?;
    let iv_bytes = hkdf_expand_label(hash, secret, b"iv", &[], IV_LEN)?;

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&iv_bytes);

    Ok((key, iv))
}

/// verify_data = HMAC(finished_key, transcript_hash) where
/// finished_key = HKDF-Expand-Label(base_key, "finished", "", Hash.length).
pub fn finished_verify_data(hash: HashAlgorithm, base_key: &[u8], transcript_hash: &[u8]) -> Result<Vec<u8>> {
    let finished_key = hkdf_expand_label(hash, base_key, b"finished", &[], hash.output_len())?;
    hash.hmac(&finished_key, transcript_hash)
}

/// Checks a peer's Finished in constant time.
pub fn verify_finished(
    hash: HashAlgorithm,
    base_key: &[u8],
    transcript_hash: &[u8],
    received: &[u8],
) -> Result<bool> {
    let finished_key = hkdf_expand_label(hash, base_key, b"finished", &[], hash.output_len())?;
    hash.verify_hmac(&finished_key, transcript_hash, received)
}

/// application_traffic_secret_N+1, installed on KeyUpdate.
pub fn next_traffic_secret(hash: HashAlgorithm, secret: &[u8]) -> Result<Vec<u8>> {
    hkdf_expand_label(hash, secret, b"traffic upd", &[], hash.output_len())
}

/// Client and server traffic secrets of one epoch.
///
/// A new epoch produces a new value; installed secrets are never modified.
#[derive(Clone, PartialEq, Eq)]
pub struct TrafficSecrets {
    pub client: Vec<u8>,
    pub server: Vec<u8>,
}

impl TrafficSecrets {
    /// Secret protecting what `role` sends.
    pub fn sender(&self, role: Role) -> &[u8] {
        match role {
            Role::Client => &self.client,
            Role::Server => &self.server,
        }
    }

    /// Secret protecting what `role` receives.
    pub fn receiver(&self, role: Role) -> &[u8] {
        match role {
            Role::Client => &self.server,
            Role::Server => &self.client,
        }
    }
}

impl std::fmt::Debug for TrafficSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficSecrets").finish_non_exhaustive()
    }
}

/// TLS 1.3 key schedule state without PSK.
pub struct KeySchedule {
    hash: HashAlgorithm,
    early_secret: Vec<u8>,
    handshake_secret: Option<Vec<u8>>,
    #[cfg(test)]
    master_secret: Option<Vec<u8>>,
}

impl KeySchedule {
    /// Early Secret = HKDF-Extract(salt = 0, ikm = 0).
    pub fn new(hash: HashAlgorithm) -> Self {
        let zeros = vec![0u8; hash.output_len()];

        Self {
            hash,
            early_secret: hash.extract(&zeros, &zeros),
            handshake_secret: None,
            #[cfg(test)]
            master_secret: None,
        }
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    #[cfg(test)]
    fn early_secret(&self) -> &[u8] {
        &self.early_secret
    }

    /// Mixes in the ECDHE secret and derives the handshake traffic secrets.
    ///
    /// `transcript_hash` covers ClientHello..ServerHello.
    pub fn derive_handshake_secrets(&mut self, shared_secret: &[u8], transcript_hash: &[u8]) -> Result<TrafficSecrets> {
        let salt = self.derived(&self.early_secret)?;
        let handshake_secret = self.hash.extract(&salt, shared_secret);

        let secrets = TrafficSecrets {
            client: derive_secret(self.hash, &handshake_secret, b"c hs traffic", transcript_hash)?,
            server: derive_secret(self.hash, &handshake_secret, b"s hs traffic", transcript_hash)?,
        };

        self.handshake_secret = Some(handshake_secret);
        Ok(secrets)
    }

    /// Derives the master secret and the application traffic secrets.
    ///
    /// `transcript_hash` covers ClientHello..server Finished.
    pub fn derive_application_secrets(&mut self, transcript_hash: &[u8]) -> Result<TrafficSecrets> {
        let Some(handshake_secret) = self.handshake_secret.as_deref() else {
            return Err(Error::Contract("handshake secret not derived yet"));
        };

        let salt = self.derived(handshake_secret)?;
        let zeros = vec![0u8; self.hash.output_len()];
        let master_secret = self.hash.extract(&salt, &zeros);

        let secrets = TrafficSecrets {
            client: derive_secret(self.hash, &master_secret, b"c ap traffic", transcript_hash)?,
            server: derive_secret(self.hash, &master_secret, b"s ap traffic", transcript_hash)?,
        };

        #[cfg(test)]
        {
            self.master_secret = Some(master_secret);
        }
        Ok(secrets)
    }

    /// Derive-Secret(secret, "derived", "").
    fn derived(&self, secret: &[u8]) -> Result<Vec<u8>> {
        derive_secret(self.hash, secret, b"derived", &self.hash.digest(&[]))
    }

    #[cfg(test)]
    fn handshake_secret(&self) -> Option<&[u8]> {
        self.handshake_secret.as_deref()
    }

    #[cfg(test)]
    fn master_secret(&self) -> Option<&[u8]> {
        self.master_secret.as_deref()
    }
}
