//! TLS 1.3 record framing (RFC 8446 section 5).

use crate::error::{Error, Result};
use crate::tls::alert::AlertDescription;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// TLS 1.3 record header size.
pub const RECORD_HEADER_LEN: usize = 5;

/// Largest plaintext fragment a record may carry.
pub const MAX_PLAINTEXT_LEN: usize = 1 << 14;

/// Largest protected record body: plaintext, inner type, padding and tag.
pub const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + 256;

/// Record version every TLS 1.3 record carries after the first ClientHello.
pub const LEGACY_RECORD_VERSION: u16 = 0x0303;

/// Record version of the initial ClientHello, for middlebox compatibility.
pub const INITIAL_RECORD_VERSION: u16 = 0x0301;

/// Body of the legacy change_cipher_spec record.
pub const CHANGE_CIPHER_SPEC_BODY: [u8; 1] = [0x01];

/// TLS record header (5 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub legacy_version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn new(content_type: ContentType, length: usize) -> Self {
        Self {
            content_type,
            legacy_version: LEGACY_RECORD_VERSION,
            length: length as u16,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let [hi, lo] = self.length.to_be_bytes();
        let [version_hi, version_lo] = self.legacy_version.to_be_bytes();

        [self.content_type as u8, version_hi, version_lo, hi, lo]
    }

    /// Decodes and validates a header.
    ///
    /// Rejects unknown content types, versions outside `0x03xx` and lengths
    /// no TLS 1.3 record can have.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let Some(header) = data.get(..RECORD_HEADER_LEN) else {
            return Err(Error::Decode("record header is five bytes"));
        };

        let content_type =
            ContentType::from_byte(header[0]).ok_or(Error::Decode("unknown record content type"))?;
        let legacy_version = u16::from_be_bytes([header[1], header[2]]);
        let length = u16::from_be_bytes([header[3], header[4]]);

        if header[1] != 0x03 {
            return Err(Error::Decode("record version is not 0x03xx"));
        }

        let limit = match content_type {
            ContentType::ApplicationData => MAX_CIPHERTEXT_LEN,
            _ => MAX_PLAINTEXT_LEN,
        };

        if length as usize > limit {
            return Err(Error::handshake(
                AlertDescription::RecordOverflow,
                "record length exceeds TLS 1.3 limit",
            ));
        }

        Ok(Self {
            content_type,
            legacy_version,
            length,
        })
    }

    /// Header plus body size.
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_LEN + self.length as usize
    }
}

/// Build a nonce for AEAD: iv XOR padded_sequence_number (RFC 8446 section 5.3).
pub fn build_nonce(iv: &[u8; 12], seq: u64) -> [u8; 12] {
    let mut nonce = *iv;
    for (byte, seq_byte) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
        *byte ^= seq_byte;
    }
    nonce
}

/// Splits a decrypted TLSInnerPlaintext into its content length and type.
///
/// The type is the last non-zero byte; everything after it is padding.
pub fn strip_padding(inner: &[u8]) -> Result<(usize, ContentType)> {
    let Some(position) = inner.iter().rposition(|&b| b != 0) else {
        return Err(Error::handshake(
            AlertDescription::UnexpectedMessage,
            "protected record has no content type",
        ));
    };

    let content_type = ContentType::from_byte(inner[position])
        .ok_or(Error::Decode("unknown inner content type"))?;

    if position > MAX_PLAINTEXT_LEN {
        return Err(Error::handshake(
            AlertDescription::RecordOverflow,
            "decrypted record exceeds TLS 1.3 limit",
        ));
    }

    Ok((position, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = RecordHeader::new(ContentType::Handshake, 300);
        assert_eq!(header.encode(), [22, 3, 3, 1, 44]);
        assert_eq!(RecordHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn oversized_records_are_rejected() {
        assert!(RecordHeader::decode(&[23, 3, 3, 0x41, 0x00]).is_ok());
        assert!(RecordHeader::decode(&[23, 3, 3, 0x41, 0x01]).is_err());
        assert!(RecordHeader::decode(&[22, 3, 3, 0x40, 0x01]).is_err());
        assert!(RecordHeader::decode(&[24, 3, 3, 0, 1]).is_err());
        assert!(RecordHeader::decode(&[22, 2, 0, 0, 1]).is_err());
        assert!(RecordHeader::decode(&[22, 3, 3]).is_err());
    }

    #[test]
    fn nonce_xors_sequence_into_iv_tail() {
        let iv = [0xffu8; 12];
        let nonce = build_nonce(&iv, 0x0102);
        assert_eq!(&nonce[..10], &[0xff; 10]);
        assert_eq!(&nonce[10..], &[0xfe, 0xfd]);
    }

    #[test]
    fn padding_is_stripped() {
        assert_eq!(
            strip_padding(&[b'h', b'i', 23, 0, 0]).unwrap(),
            (2, ContentType::ApplicationData)
        );
        assert!(strip_padding(&[0, 0, 0]).is_err());
    }
}
