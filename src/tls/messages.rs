//! TLS 1.3 handshake messages (RFC 8446 section 4).
//!
//! Every message is `msg_type (1) + length (3) + body`. The decoders here
//! take a complete message and fail with a decode error as soon as a length
//! field claims more bytes than are left.

use crate::error::{Error, Result};
use crate::tls::alert::AlertDescription;
use crate::tls::codec::{Reader, put_prefixed, put_u16, put_vec8, put_vec16, put_vec24};
use crate::tls::extensions::{
    Extension, KeyShare, KeyShareEntry, NamedGroup, SignatureScheme, SupportedVersions, decode_extensions,
    encode_extensions,
};

/// Handshake message header size.
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// `legacy_version` of ClientHello and ServerHello.
pub const LEGACY_VERSION: u16 = 0x0303;

/// ServerHello.random of a HelloRetryRequest: SHA-256("HelloRetryRequest").
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91, 0xc2, 0xa2, 0x11,
    0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EndOfEarlyData = 5,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateRequest = 13,
    CertificateVerify = 15,
    Finished = 20,
    KeyUpdate = 24,
    MessageHash = 254,
}

impl HandshakeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            4 => Some(Self::NewSessionTicket),
            5 => Some(Self::EndOfEarlyData),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            13 => Some(Self::CertificateRequest),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            24 => Some(Self::KeyUpdate),
            254 => Some(Self::MessageHash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub legacy_compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(body);

        let legacy_version = reader.u16()?;
        let random = reader.take_array()?;
        let legacy_session_id = session_id(&mut reader)?;

        let suites = reader.vec16()?;
        if suites.is_empty() || suites.len() % 2 != 0 {
            return Err(Error::Decode("malformed cipher_suites"));
        }
        let cipher_suites = suites
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        let legacy_compression_methods = reader.vec8()?.to_vec();
        let extensions = if reader.is_empty() {
            Vec::new()
        } else {
            decode_extensions(reader.vec16()?, HandshakeType::ClientHello)?
        };
        reader.finish()?;

        Ok(Self {
            legacy_version,
            random,
            legacy_session_id,
            cipher_suites,
            legacy_compression_methods,
            extensions,
        })
    }

    pub fn encode_body(&self, out: &mut Vec<u8>) {
        put_u16(out, self.legacy_version);
        out.extend_from_slice(&self.random);
        put_vec8(out, &self.legacy_session_id);
        put_prefixed(out, 2, |out| {
            for suite in &self.cipher_suites {
                put_u16(out, *suite);
            }
        });
        put_vec8(out, &self.legacy_compression_methods);
        encode_extensions(&self.extensions, out);
    }

    /// Host name from `server_name`, if the client sent one.
    pub fn server_name(&self) -> Option<&str> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::ServerName(Some(name)) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn supported_versions(&self) -> Option<&[u16]> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::SupportedVersions(SupportedVersions::Offered(versions)) => Some(versions.as_slice()),
            _ => None,
        })
    }

    pub fn supported_groups(&self) -> Option<&[NamedGroup]> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::SupportedGroups(groups) => Some(groups.as_slice()),
            _ => None,
        })
    }

    pub fn signature_algorithms(&self) -> Option<&[SignatureScheme]> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::SignatureAlgorithms(schemes) => Some(schemes.as_slice()),
            _ => None,
        })
    }

    pub fn key_shares(&self) -> Option<&[KeyShareEntry]> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::KeyShare(KeyShare::Offered(entries)) => Some(entries.as_slice()),
            _ => None,
        })
    }
}

/// ServerHello, or a HelloRetryRequest which shares its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub legacy_session_id_echo: Vec<u8>,
    pub cipher_suite: u16,
    pub legacy_compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(body);

        let legacy_version = reader.u16()?;
        let random = reader.take_array()?;
        let legacy_session_id_echo = session_id(&mut reader)?;
        let cipher_suite = reader.u16()?;
        let legacy_compression_method = reader.u8()?;
        let extensions = decode_extensions(reader.vec16()?, HandshakeType::ServerHello)?;
        reader.finish()?;

        Ok(Self {
            legacy_version,
            random,
            legacy_session_id_echo,
            cipher_suite,
            legacy_compression_method,
            extensions,
        })
    }

    pub fn encode_body(&self, out: &mut Vec<u8>) {
        put_u16(out, self.legacy_version);
        out.extend_from_slice(&self.random);
        put_vec8(out, &self.legacy_session_id_echo);
        put_u16(out, self.cipher_suite);
        out.push(self.legacy_compression_method);
        encode_extensions(&self.extensions, out);
    }

    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }

    pub fn selected_version(&self) -> Option<u16> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::SupportedVersions(SupportedVersions::Selected(version)) => Some(*version),
            _ => None,
        })
    }

    pub fn key_share(&self) -> Option<&KeyShareEntry> {
        self.extensions.iter().find_map(|extension| match extension {
            Extension::KeyShare(KeyShare::Selected(entry)) => Some(entry),
            _ => None,
        })
    }
}

fn session_id(reader: &mut Reader<'_>) -> Result<Vec<u8>> {
    let id = reader.vec8()?;
    if id.len() > 32 {
        return Err(Error::Decode("legacy_session_id longer than 32 bytes"));
    }

    Ok(id.to_vec())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// DER encoded X.509 certificate.
    pub data: Vec<u8>,
    /// Raw per-certificate extensions.
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub request_context: Vec<u8>,
    pub entries: Vec<CertificateEntry>,
}

impl Certificate {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(body);
        let request_context = reader.vec8()?.to_vec();

        let mut list = Reader::new(reader.vec24()?);
        let mut entries = Vec::new();
        while !list.is_empty() {
            let data = list.vec24()?;
            if data.is_empty() {
                return Err(Error::Decode("empty certificate entry"));
            }
            entries.push(CertificateEntry {
                data: data.to_vec(),
                extensions: list.vec16()?.to_vec(),
            });
        }
        reader.finish()?;

        Ok(Self {
            request_context,
            entries,
        })
    }

    pub fn encode_body(&self, out: &mut Vec<u8>) {
        put_vec8(out, &self.request_context);
        put_prefixed(out, 3, |out| {
            for entry in &self.entries {
                put_vec24(out, &entry.data);
                put_vec16(out, &entry.extensions);
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(body);
        let scheme = SignatureScheme(reader.u16()?);
        let signature = reader.vec16()?.to_vec();
        reader.finish()?;

        Ok(Self { scheme, signature })
    }

    pub fn encode_body(&self, out: &mut Vec<u8>) {
        put_u16(out, self.scheme.0);
        put_vec16(out, &self.signature);
    }
}

/// A parsed handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    EncryptedExtensions(Vec<Extension>),
    Certificate(Certificate),
    CertificateVerify(CertificateVerify),
    /// verify_data; its length is the suite's hash length.
    Finished(Vec<u8>),
    /// Tickets are accepted and dropped; resumption is not supported.
    NewSessionTicket(Vec<u8>),
    KeyUpdate { update_requested: bool },
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            Self::ClientHello(_) => HandshakeType::ClientHello,
            Self::ServerHello(_) => HandshakeType::ServerHello,
            Self::EncryptedExtensions(_) => HandshakeType::EncryptedExtensions,
            Self::Certificate(_) => HandshakeType::Certificate,
            Self::CertificateVerify(_) => HandshakeType::CertificateVerify,
            Self::Finished(_) => HandshakeType::Finished,
            Self::NewSessionTicket(_) => HandshakeType::NewSessionTicket,
            Self::KeyUpdate { .. } => HandshakeType::KeyUpdate,
        }
    }

    /// Decodes one complete message, header included.
    pub fn decode(message: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(message);
        let msg_type = reader.u8()?;
        let body = reader.vec24()?;
        reader.finish()?;

        let Some(msg_type) = HandshakeType::from_u8(msg_type) else {
            return Err(Error::handshake(
                AlertDescription::UnexpectedMessage,
                "unknown handshake message type",
            ));
        };

        Ok(match msg_type {
            HandshakeType::ClientHello => Self::ClientHello(ClientHello::decode(body)?),
            HandshakeType::ServerHello => Self::ServerHello(ServerHello::decode(body)?),
            HandshakeType::EncryptedExtensions => {
                let mut reader = Reader::new(body);
                let extensions = decode_extensions(reader.vec16()?, HandshakeType::EncryptedExtensions)?;
                reader.finish()?;
                Self::EncryptedExtensions(extensions)
            }
            HandshakeType::Certificate => Self::Certificate(Certificate::decode(body)?),
            HandshakeType::CertificateVerify => Self::CertificateVerify(CertificateVerify::decode(body)?),
            HandshakeType::Finished => Self::Finished(body.to_vec()),
            HandshakeType::NewSessionTicket => Self::NewSessionTicket(body.to_vec()),
            HandshakeType::KeyUpdate => {
                let update_requested = match body {
                    [0] => false,
                    [1] => true,
                    _ => {
                        return Err(Error::handshake(
                            AlertDescription::IllegalParameter,
                            "malformed KeyUpdate",
                        ));
                    }
                };
                Self::KeyUpdate { update_requested }
            }
            _ => {
                return Err(Error::handshake(
                    AlertDescription::UnexpectedMessage,
                    "handshake message not supported",
                ));
            }
        })
    }

    /// Encodes the message with its four byte header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.handshake_type() as u8];

        put_prefixed(&mut out, 3, |out| match self {
            Self::ClientHello(hello) => hello.encode_body(out),
            Self::ServerHello(hello) => hello.encode_body(out),
            Self::EncryptedExtensions(extensions) => encode_extensions(extensions, out),
            Self::Certificate(certificate) => certificate.encode_body(out),
            Self::CertificateVerify(verify) => verify.encode_body(out),
            Self::Finished(verify_data) => out.extend_from_slice(verify_data),
            Self::NewSessionTicket(body) => out.extend_from_slice(body),
            Self::KeyUpdate { update_requested } => out.push(u8::from(*update_requested)),
        });

        out
    }
}

/// Total length of the message starting at `data`, once its header is there.
pub fn message_len(data: &[u8]) -> Option<usize> {
    match data {
        [_, a, b, c, ..] => Some(HANDSHAKE_HEADER_LEN + (((*a as usize) << 16) | ((*b as usize) << 8) | *c as usize)),
        _ => None,
    }
}
