//! Ed25519 CertificateVerify signatures and self-signed certificates.
//!
//! Only what the handshake needs: the signed content of RFC 8446 section
//! 4.4.3, a self-signed Ed25519 certificate for test and embedded servers,
//! and the Ed25519 key of a certificate's SubjectPublicKeyInfo. Chain
//! validation is not performed.

use crate::error::{Error, Result};
use crate::tls::alert::AlertDescription;

use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ED25519};
use rustls_pki_types::PrivatePkcs8KeyDer;
use x509_parser::oid_registry::OID_SIG_ED25519;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Context string for server CertificateVerify.
pub const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// 64 spaces, the context string, a zero byte, then the transcript hash.
pub fn certificate_verify_content(context: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    content.resize(64, 0x20);
    content.extend_from_slice(context);
    content.push(0x00);
    content.extend_from_slice(transcript_hash);
    content
}

pub fn sign_certificate_verify(key: &SigningKey, context: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let content = certificate_verify_content(context, transcript_hash);
    key.sign(&content).to_bytes().to_vec()
}

/// Checks a CertificateVerify signature against the key in `certificate`.
pub fn verify_certificate_verify(
    certificate: &[u8],
    context: &[u8],
    signature: &[u8],
    transcript_hash: &[u8],
) -> Result<()> {
    let public_key = ed25519_public_key(certificate)?;
    let verifying_key = VerifyingKey::from_bytes(&public_key).map_err(|_| {
        Error::handshake(AlertDescription::BadCertificate, "certificate key is not a valid Ed25519 point")
    })?;

    let signature = Signature::from_slice(signature)
        .map_err(|_| Error::handshake(AlertDescription::DecodeError, "Ed25519 signature is not 64 bytes"))?;

    let content = certificate_verify_content(context, transcript_hash);
    verifying_key
        .verify(&content, &signature)
        .map_err(|_| Error::handshake(AlertDescription::DecryptError, "CertificateVerify signature mismatch"))
}

/// Ed25519 public key carried in the SubjectPublicKeyInfo of `certificate`.
pub fn ed25519_public_key(certificate: &[u8]) -> Result<[u8; 32]> {
    let (_, parsed) = X509Certificate::from_der(certificate)
        .map_err(|_| Error::handshake(AlertDescription::BadCertificate, "certificate is not valid X.509 DER"))?;

    let spki = parsed.public_key();
    if spki.algorithm.algorithm != OID_SIG_ED25519 {
        return Err(Error::handshake(
            AlertDescription::UnsupportedCertificate,
            "certificate key is not Ed25519",
        ));
    }

    <[u8; 32]>::try_from(&spki.subject_public_key.data[..])
        .map_err(|_| Error::handshake(AlertDescription::BadCertificate, "Ed25519 public key is not 32 bytes"))
}

/// Builds a self-signed X.509 v3 certificate for `key`.
///
/// `common_name` becomes the subject common name and the single DNS
/// subject alternative name.
pub fn self_signed_certificate(key: &SigningKey, common_name: &str) -> Result<Vec<u8>> {
    let pkcs8 = key
        .to_pkcs8_der()
        .map_err(|_| Error::Contract("Ed25519 key cannot be encoded as PKCS#8"))?;
    let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(&PrivatePkcs8KeyDer::from(pkcs8.as_bytes()), &PKCS_ED25519)?;

    let mut params = CertificateParams::new(vec![common_name.to_owned()])?;
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);

    let certificate = params.self_signed(&key_pair)?;
    Ok(certificate.der().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

    /// DER prefix of an Ed25519 SubjectPublicKeyInfo, up to the key bytes.
    const SPKI_PREFIX: [u8; 12] = [0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00];

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[0x42; 32])
    }

    #[test]
    fn content_layout() {
        let content = certificate_verify_content(SERVER_CONTEXT, &[0xab; 32]);

        assert_eq!(content.len(), 64 + SERVER_CONTEXT.len() + 1 + 32);
        assert!(content[..64].iter().all(|&b| b == 0x20));
        assert_eq!(&content[64..64 + SERVER_CONTEXT.len()], SERVER_CONTEXT);
        assert_eq!(content[64 + SERVER_CONTEXT.len()], 0);
    }

    #[test]
    fn certificate_carries_the_public_key() {
        let key = key();
        let certificate = self_signed_certificate(&key, "localhost").unwrap();

        assert_eq!(certificate[0], 0x30);
        assert_eq!(&ed25519_public_key(&certificate).unwrap(), key.verifying_key().as_bytes());
    }

    #[test]
    fn sign_and_verify() {
        let key = key();
        let certificate = self_signed_certificate(&key, "localhost").unwrap();
        let hash = [7u8; 48];

        let signature = sign_certificate_verify(&key, SERVER_CONTEXT, &hash);
        verify_certificate_verify(&certificate, SERVER_CONTEXT, &signature, &hash).unwrap();

        // Client context or another transcript must not verify.
        assert!(verify_certificate_verify(&certificate, CLIENT_CONTEXT, &signature, &hash).is_err());
        assert!(verify_certificate_verify(&certificate, SERVER_CONTEXT, &signature, &[8u8; 48]).is_err());
    }

    #[test]
    fn key_comes_from_the_key_field_not_the_subject() {
        let key = key();

        // A subject that embeds a key-shaped byte run must not be mistaken for the key.
        let mut name = String::from_utf8(SPKI_PREFIX.to_vec()).unwrap();
        name.push_str(&"A".repeat(32));
        let certificate = self_signed_certificate(&key, &name).unwrap();

        let position = certificate.windows(SPKI_PREFIX.len()).position(|w| w == SPKI_PREFIX);
        assert_eq!(&certificate[position.unwrap() + SPKI_PREFIX.len()..][..32], &[b'A'; 32]);
        assert_eq!(&ed25519_public_key(&certificate).unwrap(), key.verifying_key().as_bytes());
    }

    #[test]
    fn non_ed25519_certificate_is_rejected() {
        assert!(ed25519_public_key(&[0x30, 0x03, 0x02, 0x01, 0x01]).is_err());

        let ecdsa = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let err = ed25519_public_key(ecdsa.cert.der()).unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake {
                alert: AlertDescription::UnsupportedCertificate,
                ..
            }
        ));
    }
}
