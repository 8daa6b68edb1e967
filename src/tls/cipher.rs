//! Cipher suites and the hash and AEAD primitives behind them.

use crate::error::{Error, Result};

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384};

/// AEAD nonce length for every TLS 1.3 suite.
pub const IV_LEN: usize = 12;

/// AEAD tag length for every supported suite.
pub const TAG_LEN: usize = 16;

/// TLS 1.3 cipher suites this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// TLS_AES_128_GCM_SHA256 (0x1301)
    Aes128GcmSha256,
    /// TLS_AES_256_GCM_SHA384 (0x1302)
    Aes256GcmSha384,
    /// TLS_CHACHA20_POLY1305_SHA256 (0x1303)
    Chacha20Poly1305Sha256,
}

impl CipherSuite {
    pub const ALL: [Self; 3] = [
        Self::Aes256GcmSha384,
        Self::Chacha20Poly1305Sha256,
        Self::Aes128GcmSha256,
    ];

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1301 => Some(Self::Aes128GcmSha256),
            0x1302 => Some(Self::Aes256GcmSha384),
            0x1303 => Some(Self::Chacha20Poly1305Sha256),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::Aes128GcmSha256 => 0x1301,
            Self::Aes256GcmSha384 => 0x1302,
            Self::Chacha20Poly1305Sha256 => 0x1303,
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128GcmSha256 => 16,
            Self::Aes256GcmSha384 | Self::Chacha20Poly1305Sha256 => 32,
        }
    }

    pub fn hash(self) -> HashAlgorithm {
        match self {
            Self::Aes256GcmSha384 => HashAlgorithm::Sha384,
            Self::Aes128GcmSha256 | Self::Chacha20Poly1305Sha256 => HashAlgorithm::Sha256,
        }
    }
}

/// Hash function of a cipher suite, with the HKDF and HMAC built on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
        }
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Sha256 => {
                let mut mac = <Hmac<Sha256> as KeyInit>::new_from_slice(key).map_err(invalid_mac_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha384 => {
                let mut mac = <Hmac<Sha384> as KeyInit>::new_from_slice(key).map_err(invalid_mac_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        })
    }

    /// Checks an HMAC in constant time.
    pub fn verify_hmac(self, key: &[u8], data: &[u8], expected: &[u8]) -> Result<bool> {
        Ok(match self {
            Self::Sha256 => {
                let mut mac = <Hmac<Sha256> as KeyInit>::new_from_slice(key).map_err(invalid_mac_key)?;
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
            Self::Sha384 => {
                let mut mac = <Hmac<Sha384> as KeyInit>::new_from_slice(key).map_err(invalid_mac_key)?;
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
        })
    }

    /// HKDF-Extract.
    pub fn extract(self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec(),
            Self::Sha384 => Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec(),
        }
    }

    /// HKDF-Expand of `prk` into `out`.
    pub fn expand(self, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
        let expanded = match self {
            Self::Sha256 => Hkdf::<Sha256>::from_prk(prk)
                .map_err(|_| Error::Contract("pseudorandom key too short"))?
                .expand(info, out),
            Self::Sha384 => Hkdf::<Sha384>::from_prk(prk)
                .map_err(|_| Error::Contract("pseudorandom key too short"))?
                .expand(info, out),
        };

        expanded.map_err(|_| Error::Contract("HKDF output too long"))
    }
}

fn invalid_mac_key(_: hmac::digest::InvalidLength) -> Error {
    Error::Contract("invalid HMAC key")
}

/// Keyed AEAD for one direction of a connection.
pub(crate) enum RecordAead {
    Aes128Gcm(Box<Aes128Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
}

impl RecordAead {
    pub(crate) fn new(suite: CipherSuite, key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::Contract("traffic key has the wrong length");

        Ok(match suite {
            CipherSuite::Aes128GcmSha256 => {
                Self::Aes128Gcm(Box::new(Aes128Gcm::new_from_slice(key).map_err(invalid)?))
            }
            CipherSuite::Aes256GcmSha384 => {
                Self::Aes256Gcm(Box::new(Aes256Gcm::new_from_slice(key).map_err(invalid)?))
            }
            CipherSuite::Chacha20Poly1305Sha256 => Self::ChaCha20Poly1305(Box::new(
                ChaCha20Poly1305::new_from_slice(key).map_err(invalid)?,
            )),
        })
    }

    /// Encrypts `buffer` in place and returns the detached tag.
    pub(crate) fn seal(&self, nonce: &[u8; IV_LEN], aad: &[u8], buffer: &mut [u8]) -> Result<[u8; TAG_LEN]> {
        let nonce = GenericArray::from_slice(nonce);

        let tag = match self {
            Self::Aes128Gcm(cipher) => cipher.encrypt_in_place_detached(nonce, aad, buffer),
            Self::Aes256Gcm(cipher) => cipher.encrypt_in_place_detached(nonce, aad, buffer),
            Self::ChaCha20Poly1305(cipher) => cipher.encrypt_in_place_detached(nonce, aad, buffer),
        }
        .map_err(|_| Error::Contract("record too large to encrypt"))?;

        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Decrypts `buffer` in place after checking `tag`.
    pub(crate) fn open(
        &self,
        nonce: &[u8; IV_LEN],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<()> {
        let nonce = GenericArray::from_slice(nonce);
        let tag = GenericArray::from_slice(tag);

        match self {
            Self::Aes128Gcm(cipher) => cipher.decrypt_in_place_detached(nonce, aad, buffer, tag),
            Self::Aes256Gcm(cipher) => cipher.decrypt_in_place_detached(nonce, aad, buffer, tag),
            Self::ChaCha20Poly1305(cipher) => cipher.decrypt_in_place_detached(nonce, aad, buffer, tag),
        }
        .map_err(|_| Error::Authentication)
    }
}
