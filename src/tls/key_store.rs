//! Server identities selected by SNI.

use crate::error::Result;
use crate::tls::signature::self_signed_certificate;

use ed25519_dalek::SigningKey;
use std::collections::HashMap;
use std::fmt;

/// Certificate chain and the key that signs for its leaf.
#[derive(Clone)]
pub struct Identity {
    certificate_chain: Vec<Vec<u8>>,
    signing_key: SigningKey,
}

impl Identity {
    /// `certificate_chain` is leaf first, each entry DER encoded.
    pub fn new(certificate_chain: Vec<Vec<u8>>, signing_key: SigningKey) -> Self {
        Self {
            certificate_chain,
            signing_key,
        }
    }

    /// Identity with a freshly built self-signed certificate.
    ///
    /// # Example
    /// ```ignore
    /// let identity = Identity::self_signed([7u8; 32], "localhost")?;
    /// ```
    pub fn self_signed(seed: [u8; 32], common_name: &str) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(&seed);
        let certificate = self_signed_certificate(&signing_key, common_name)?;

        Ok(Self::new(vec![certificate], signing_key))
    }

    pub fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.certificate_chain
    }

    /// Leaf certificate, if the chain is not empty.
    pub fn leaf(&self) -> Option<&[u8]> {
        self.certificate_chain.first().map(Vec::as_slice)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("certificates", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

/// Identities a server can present, keyed by host name.
#[derive(Debug, Default, Clone)]
pub struct KeyStore {
    identities: HashMap<String, Identity>,
    default: Option<Identity>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a single identity used for every server name.
    pub fn with_default(identity: Identity) -> Self {
        let mut store = Self::new();
        store.set_default(identity);
        store
    }

    /// Registers `identity` for `hostname` (case-insensitive).
    pub fn add(&mut self, hostname: &str, identity: Identity) {
        self.identities.insert(hostname.to_ascii_lowercase(), identity);
    }

    /// Identity used when the client sends no server name or an unknown one.
    pub fn set_default(&mut self, identity: Identity) {
        self.default = Some(identity);
    }

    /// Identity for `server_name`, falling back to the default.
    pub fn lookup(&self, server_name: Option<&str>) -> Option<&Identity> {
        server_name
            .and_then(|name| self.identities.get(&name.to_ascii_lowercase()))
            .or(self.default.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty() && self.default.is_none()
    }
}
