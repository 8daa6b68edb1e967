//! Per-direction AEAD protection of TLS records.
//!
//! A [`RecordCryptor`] holds the negotiated suite plus, for each direction,
//! the keyed cipher, the static IV and the record sequence number. The nonce
//! of every record is the IV XOR the big-endian sequence number, and the
//! sequence number advances once per record whether or not the record could
//! be protected or opened.

use crate::error::{Error, Result};
use crate::tls::Role;
use crate::tls::cipher::{CipherSuite, IV_LEN, RecordAead, TAG_LEN};
use crate::tls::key_schedule::{TrafficSecrets, traffic_key_and_iv};
use crate::tls::record::build_nonce;

struct DirectionState {
    aead: RecordAead,
    iv: [u8; IV_LEN],
    sequence: u64,
}

impl DirectionState {
    fn new(suite: CipherSuite, key: &[u8], iv: [u8; IV_LEN]) -> Result<Self> {
        Ok(Self {
            aead: RecordAead::new(suite, key)?,
            iv,
            sequence: 0,
        })
    }

    /// Nonce for the current record; moves the sequence number past it.
    fn next_nonce(&mut self) -> Result<[u8; IV_LEN]> {
        let nonce = build_nonce(&self.iv, self.sequence);
        self.sequence = self
            .sequence
            .checked_add(1)
            .ok_or(Error::Contract("record sequence number exhausted"))?;

        Ok(nonce)
    }
}

/// Record protection state of one connection.
///
/// # Example
/// ```ignore
/// let mut cryptor = RecordCryptor::new();
/// cryptor.set_cipher_suite(CipherSuite::Aes128GcmSha256);
/// cryptor.set_traffic_secrets(&client_secret, &server_secret)?;
///
/// let mut tag = [0u8; TAG_LEN];
/// let length = cryptor.encrypt(b"hello", &header, &mut out, &mut tag)?;
/// ```
#[derive(Default)]
pub struct RecordCryptor {
    suite: Option<CipherSuite>,
    sender: Option<DirectionState>,
    receiver: Option<DirectionState>,
}

impl RecordCryptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the AEAD algorithm, key size and hash used for later secrets.
    ///
    /// Keys installed for a previous suite are dropped.
    pub fn set_cipher_suite(&mut self, suite: CipherSuite) {
        if self.suite != Some(suite) {
            self.sender = None;
            self.receiver = None;
        }
        self.suite = Some(suite);
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    /// Authentication tag length appended to every protected record.
    pub fn tag_size(&self) -> usize {
        TAG_LEN
    }

    /// Derives keys and IVs for both directions and restarts both sequences.
    pub fn set_traffic_secrets(&mut self, sender_secret: &[u8], receiver_secret: &[u8]) -> Result<()> {
        self.set_sender_secret(sender_secret)?;
        self.set_receiver_secret(receiver_secret)
    }

    /// Installs the handshake epoch as seen from `role`.
    pub fn set_handshake_traffic_secrets(&mut self, secrets: &TrafficSecrets, role: Role) -> Result<()> {
        self.set_traffic_secrets(secrets.sender(role), secrets.receiver(role))
    }

    /// Installs the application epoch as seen from `role`.
    pub fn set_application_traffic_secrets(&mut self, secrets: &TrafficSecrets, role: Role) -> Result<()> {
        self.set_traffic_secrets(secrets.sender(role), secrets.receiver(role))
    }

    pub fn set_sender_secret(&mut self, secret: &[u8]) -> Result<()> {
        let suite = self.suite()?;
        let (key, iv) = traffic_key_and_iv(suite, secret)?;
        self.sender = Some(DirectionState::new(suite, &key, iv)?);

        Ok(())
    }

    pub fn set_receiver_secret(&mut self, secret: &[u8]) -> Result<()> {
        let suite = self.suite()?;
        let (key, iv) = traffic_key_and_iv(suite, secret)?;
        self.receiver = Some(DirectionState::new(suite, &key, iv)?);

        Ok(())
    }

    /// Installs raw sender key material, bypassing the key schedule.
    pub fn set_sender_key(&mut self, key: &[u8], iv: [u8; IV_LEN]) -> Result<()> {
        self.sender = Some(DirectionState::new(self.suite()?, key, iv)?);
        Ok(())
    }

    /// Installs raw receiver key material, bypassing the key schedule.
    pub fn set_receiver_key(&mut self, key: &[u8], iv: [u8; IV_LEN]) -> Result<()> {
        self.receiver = Some(DirectionState::new(self.suite()?, key, iv)?);
        Ok(())
    }

    pub fn has_sender_keys(&self) -> bool {
        self.sender.is_some()
    }

    pub fn has_receiver_keys(&self) -> bool {
        self.receiver.is_some()
    }

    /// Sequence number the next outgoing record will use.
    pub fn sender_sequence(&self) -> Option<u64> {
        self.sender.as_ref().map(|state| state.sequence)
    }

    /// Sequence number the next incoming record will use.
    pub fn receiver_sequence(&self) -> Option<u64> {
        self.receiver.as_ref().map(|state| state.sequence)
    }

    /// Encrypts `plaintext` into `out` and writes the tag into `out_tag`.
    ///
    /// Returns the ciphertext length, which equals the plaintext length.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        aad: &[u8],
        out: &mut [u8],
        out_tag: &mut [u8; TAG_LEN],
    ) -> Result<usize> {
        self.encrypt2(plaintext, &[], aad, out, out_tag)
    }

    /// Encrypts the concatenation of `head` and `tail`.
    ///
    /// The output is byte-identical to [`encrypt`](Self::encrypt) on the
    /// joined plaintext; record content and its trailing type byte are kept
    /// apart by the caller and joined only here.
    pub fn encrypt2(
        &mut self,
        head: &[u8],
        tail: &[u8],
        aad: &[u8],
        out: &mut [u8],
        out_tag: &mut [u8; TAG_LEN],
    ) -> Result<usize> {
        let length = head.len() + tail.len();
        let state = self.sender.as_mut().ok_or(Error::Contract("no sender keys installed"))?;
        let nonce = state.next_nonce()?;

        let Some(out) = out.get_mut(..length) else {
            return Err(Error::Contract("ciphertext buffer too small"));
        };

        out[..head.len()].copy_from_slice(head);
        out[head.len()..].copy_from_slice(tail);

        *out_tag = state.aead.seal(&nonce, aad, out)?;
        Ok(length)
    }

    /// Checks `tag` and decrypts `ciphertext` into `out`.
    ///
    /// On authentication failure `out` is zeroed, so no unauthenticated byte
    /// ever reaches the caller.
    pub fn decrypt(
        &mut self,
        ciphertext: &[u8],
        aad: &[u8],
        tag: &[u8; TAG_LEN],
        out: &mut [u8],
    ) -> Result<usize> {
        let length = ciphertext.len();
        let state = self
            .receiver
            .as_mut()
            .ok_or(Error::Contract("no receiver keys installed"))?;
        let nonce = state.next_nonce()?;

        let Some(out) = out.get_mut(..length) else {
            return Err(Error::Contract("plaintext buffer too small"));
        };

        out.copy_from_slice(ciphertext);

        if let Err(err) = state.aead.open(&nonce, aad, out, tag) {
            out.fill(0);
            return Err(err);
        }

        Ok(length)
    }

    /// Encrypts `buffer` in place and returns the tag.
    #[cfg(test)]
    pub(crate) fn seal_in_place(&mut self, aad: &[u8], buffer: &mut [u8]) -> Result<[u8; TAG_LEN]> {
        let state = self.sender.as_mut().ok_or(Error::Contract("no sender keys installed"))?;
        let nonce = state.next_nonce()?;

        state.aead.seal(&nonce, aad, buffer)
    }

    /// Decrypts `buffer` in place; zeroes it if `tag` does not verify.
    pub(crate) fn open_in_place(&mut self, aad: &[u8], buffer: &mut [u8], tag: &[u8; TAG_LEN]) -> Result<()> {
        let state = self
            .receiver
            .as_mut()
            .ok_or(Error::Contract("no receiver keys installed"))?;
        let nonce = state.next_nonce()?;

        let result = state.aead.open(&nonce, aad, buffer, tag);
        if result.is_err() {
            buffer.fill(0);
        }

        result
    }

    fn suite(&self) -> Result<CipherSuite> {
        self.suite.ok_or(Error::Contract("cipher suite not selected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const AAD: &[u8] = b"today is good day";
    const IV: [u8; IV_LEN] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

    fn key(length: usize) -> Vec<u8> {
        (0..length as u8).collect()
    }

    fn keyed(suite: CipherSuite) -> RecordCryptor {
        let mut cryptor = RecordCryptor::new();
        cryptor.set_cipher_suite(suite);
        cryptor.set_sender_key(&key(suite.key_len()), IV).unwrap();
        cryptor.set_receiver_key(&key(suite.key_len()), IV).unwrap();
        cryptor
    }

    #[test]
    fn encrypt_then_decrypt_every_suite() {
        let plaintext = b"Hello, world! // tls record cryptor!!!";

        for suite in CipherSuite::ALL {
            let mut cryptor = keyed(suite);
            let mut ciphertext = [0u8; 64];
            let mut tag = [0u8; TAG_LEN];

            let length = cryptor.encrypt(plaintext, AAD, &mut ciphertext, &mut tag).unwrap();
            assert_eq!(length, plaintext.len());
            assert_ne!(&ciphertext[..length], plaintext);

            let mut decrypted = [0u8; 64];
            let length = cryptor
                .decrypt(&ciphertext[..length], AAD, &tag, &mut decrypted)
                .unwrap();
            assert_eq!(&decrypted[..length], plaintext);
        }
    }

    #[test]
    fn two_part_encrypt_matches_single_part() {
        let plaintext = b"Hello, world! // tls aes_128_gcm!!!";
        let split = plaintext.len() - plaintext.len() / 4;

        let mut whole = keyed(CipherSuite::Aes128GcmSha256);
        let mut parts = keyed(CipherSuite::Aes128GcmSha256);

        let (mut a, mut b) = ([0u8; 64], [0u8; 64]);
        let (mut tag_a, mut tag_b) = ([0u8; TAG_LEN], [0u8; TAG_LEN]);

        whole.encrypt(plaintext, AAD, &mut a, &mut tag_a).unwrap();
        parts
            .encrypt2(&plaintext[..split], &plaintext[split..], AAD, &mut b, &mut tag_b)
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(tag_a, tag_b);
    }

    #[test]
    fn failed_decrypt_releases_nothing_and_still_counts() {
        let mut cryptor = keyed(CipherSuite::Chacha20Poly1305Sha256);
        let mut ciphertext = [0u8; 16];
        let mut tag = [0u8; TAG_LEN];
        cryptor.encrypt(b"sixteen byte msg", AAD, &mut ciphertext, &mut tag).unwrap();

        tag[0] ^= 1;
        let mut out = [0xaau8; 16];
        let err = cryptor.decrypt(&ciphertext, AAD, &tag, &mut out).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(out, [0u8; 16]);
        assert_eq!(cryptor.receiver_sequence(), Some(1));
    }

    #[test]
    fn keys_come_from_traffic_secrets() {
        let secrets = TrafficSecrets {
            client: vec![1u8; 32],
            server: vec![2u8; 32],
        };

        let mut client = RecordCryptor::new();
        client.set_cipher_suite(CipherSuite::Aes128GcmSha256);
        client.set_handshake_traffic_secrets(&secrets, Role::Client).unwrap();

        let mut server = RecordCryptor::new();
        server.set_cipher_suite(CipherSuite::Aes128GcmSha256);
        server.set_handshake_traffic_secrets(&secrets, Role::Server).unwrap();

        let mut buffer = *b"ping";
        let tag = client.seal_in_place(AAD, &mut buffer).unwrap();
        server.open_in_place(AAD, &mut buffer, &tag).unwrap();
        assert_eq!(&buffer, b"ping");

        // Both directions use different keys.
        let mut buffer = *b"ping";
        let tag = client.seal_in_place(AAD, &mut buffer).unwrap();
        assert!(client.open_in_place(AAD, &mut buffer, &tag).is_err());
    }

    #[test]
    fn missing_keys_are_a_contract_error() {
        let mut cryptor = RecordCryptor::new();
        let mut tag = [0u8; TAG_LEN];
        let err = cryptor.encrypt(b"x", AAD, &mut [0u8; 1], &mut tag).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProgrammingContract);

        assert!(cryptor.set_sender_secret(&[0u8; 32]).is_err());
    }
}
