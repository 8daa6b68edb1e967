//! Client and server handshake settings.
//!
//! Both follow the builder style of [`PollerBuilder`](crate::PollerBuilder):
//! start from `default()` and chain setters.

use crate::tls::cipher::CipherSuite;

/// Change_cipher_spec records tolerated per connection unless configured.
pub const DEFAULT_MAX_CHANGE_CIPHER_SPEC: usize = 4;

/// Settings for the connecting side.
///
/// # Example
/// ```ignore
/// let config = ClientConfig::default()
///     .cipher_suites(&[CipherSuite::Chacha20Poly1305Sha256])
///     .pin_certificate(server_certificate);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) cipher_suites: Vec<CipherSuite>,
    pub(crate) middlebox_compat: bool,
    pub(crate) max_change_cipher_spec: usize,
    pub(crate) pinned_certificates: Vec<Vec<u8>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cipher_suites: CipherSuite::ALL.to_vec(),
            middlebox_compat: true,
            max_change_cipher_spec: DEFAULT_MAX_CHANGE_CIPHER_SPEC,
            pinned_certificates: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Suites offered in ClientHello, most preferred first.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Sends a legacy session id and a change_cipher_spec before the second
    /// flight so the handshake looks like a TLS 1.2 resumption on the wire.
    pub fn middlebox_compat(mut self, enabled: bool) -> Self {
        self.middlebox_compat = enabled;
        self
    }

    pub fn max_change_cipher_spec(mut self, limit: usize) -> Self {
        self.max_change_cipher_spec = limit;
        self
    }

    /// Accepts only servers whose leaf certificate equals one of the pinned
    /// certificates byte for byte. Without pins any Ed25519 leaf is accepted.
    pub fn pin_certificate(mut self, certificate: Vec<u8>) -> Self {
        self.pinned_certificates.push(certificate);
        self
    }
}

/// Settings for the accepting side.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) cipher_suites: Vec<CipherSuite>,
    pub(crate) middlebox_compat: bool,
    pub(crate) max_change_cipher_spec: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cipher_suites: CipherSuite::ALL.to_vec(),
            middlebox_compat: true,
            max_change_cipher_spec: DEFAULT_MAX_CHANGE_CIPHER_SPEC,
        }
    }
}

impl ServerConfig {
    /// Suites the server accepts, in its order of preference.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Sends change_cipher_spec after ServerHello when the client sent a
    /// legacy session id.
    pub fn middlebox_compat(mut self, enabled: bool) -> Self {
        self.middlebox_compat = enabled;
        self
    }

    pub fn max_change_cipher_spec(mut self, limit: usize) -> Self {
        self.max_change_cipher_spec = limit;
        self
    }
}
