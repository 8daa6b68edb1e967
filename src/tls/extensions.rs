//! Handshake extensions (RFC 8446 section 4.2).
//!
//! Extension format: type (2 bytes) + length (2 bytes) + data. The types
//! this crate acts on are decoded into typed values; every other type is
//! kept as opaque bytes so that re-encoding reproduces the input exactly.

use crate::error::{Error, Result};
use crate::tls::codec::{Reader, put_prefixed, put_u16, put_vec8, put_vec16};
use crate::tls::messages::HandshakeType;

pub const EXT_SERVER_NAME: u16 = 0x0000;
pub const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
pub const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;
pub const EXT_PSK_KEY_EXCHANGE_MODES: u16 = 0x002d;
pub const EXT_KEY_SHARE: u16 = 0x0033;

/// `supported_versions` value of TLS 1.3.
pub const TLS13_VERSION: u16 = 0x0304;

/// ServerNameList entry type of a DNS host name.
const HOST_NAME_TYPE: u8 = 0;

/// Key exchange group code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedGroup(pub u16);

impl NamedGroup {
    pub const X25519: Self = Self(0x001d);
}

/// Signature algorithm code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureScheme(pub u16);

impl SignatureScheme {
    pub const ED25519: Self = Self(0x0807);
}

/// PskKeyExchangeMode `psk_dhe_ke`.
pub const PSK_DHE_KE: u8 = 1;

/// One (group, public key) pair of a `key_share` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportedVersions {
    /// ClientHello form: every version the client accepts.
    Offered(Vec<u16>),
    /// ServerHello form: the version the server picked.
    Selected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyShare {
    /// ClientHello form.
    Offered(Vec<KeyShareEntry>),
    /// ServerHello form.
    Selected(KeyShareEntry),
    /// HelloRetryRequest form: the group the server asks for.
    Retry(NamedGroup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// Requested host name. Servers acknowledge with an empty extension,
    /// which decodes as `None`.
    ServerName(Option<String>),
    SupportedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    SupportedVersions(SupportedVersions),
    PskKeyExchangeModes(Vec<u8>),
    KeyShare(KeyShare),
    /// Any type this crate does not interpret.
    Unknown { ext_type: u16, data: Vec<u8> },
}

impl Extension {
    pub fn ext_type(&self) -> u16 {
        match self {
            Self::ServerName(_) => EXT_SERVER_NAME,
            Self::SupportedGroups(_) => EXT_SUPPORTED_GROUPS,
            Self::SignatureAlgorithms(_) => EXT_SIGNATURE_ALGORITHMS,
            Self::SupportedVersions(_) => EXT_SUPPORTED_VERSIONS,
            Self::PskKeyExchangeModes(_) => EXT_PSK_KEY_EXCHANGE_MODES,
            Self::KeyShare(_) => EXT_KEY_SHARE,
            Self::Unknown { ext_type, .. } => *ext_type,
        }
    }

    /// Decodes one extension body.
    ///
    /// `context` is the message the extension arrived in; `supported_versions`
    /// and `key_share` have different layouts in ClientHello and ServerHello.
    pub fn decode(ext_type: u16, data: &[u8], context: HandshakeType) -> Result<Self> {
        let mut reader = Reader::new(data);

        let extension = match ext_type {
            EXT_SERVER_NAME => Self::ServerName(decode_server_name(&mut reader)?),
            EXT_SUPPORTED_GROUPS => Self::SupportedGroups(
                decode_u16_list(reader.vec16()?)?.into_iter().map(NamedGroup).collect(),
            ),
            EXT_SIGNATURE_ALGORITHMS => Self::SignatureAlgorithms(
                decode_u16_list(reader.vec16()?)?
                    .into_iter()
                    .map(SignatureScheme)
                    .collect(),
            ),
            EXT_SUPPORTED_VERSIONS if context == HandshakeType::ClientHello => {
                Self::SupportedVersions(SupportedVersions::Offered(decode_u16_list(reader.vec8()?)?))
            }
            EXT_SUPPORTED_VERSIONS => Self::SupportedVersions(SupportedVersions::Selected(reader.u16()?)),
            EXT_PSK_KEY_EXCHANGE_MODES => Self::PskKeyExchangeModes(reader.vec8()?.to_vec()),
            EXT_KEY_SHARE if context == HandshakeType::ClientHello => {
                let mut entries = Reader::new(reader.vec16()?);
                let mut shares = Vec::new();
                while !entries.is_empty() {
                    shares.push(decode_key_share_entry(&mut entries)?);
                }
                Self::KeyShare(KeyShare::Offered(shares))
            }
            EXT_KEY_SHARE if data.len() == 2 => Self::KeyShare(KeyShare::Retry(NamedGroup(reader.u16()?))),
            EXT_KEY_SHARE => Self::KeyShare(KeyShare::Selected(decode_key_share_entry(&mut reader)?)),
            _ => {
                return Ok(Self::Unknown {
                    ext_type,
                    data: data.to_vec(),
                });
            }
        };

        reader.finish()?;
        Ok(extension)
    }

    /// Appends type, length and body.
    pub fn encode(&self, out: &mut Vec<u8>) {
        put_u16(out, self.ext_type());
        put_prefixed(out, 2, |out| self.encode_body(out));
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        match self {
            Self::ServerName(None) => {}
            Self::ServerName(Some(name)) => put_prefixed(out, 2, |out| {
                out.push(HOST_NAME_TYPE);
                put_vec16(out, name.as_bytes());
            }),
            Self::SupportedGroups(groups) => put_prefixed(out, 2, |out| {
                for group in groups {
                    put_u16(out, group.0);
                }
            }),
            Self::SignatureAlgorithms(schemes) => put_prefixed(out, 2, |out| {
                for scheme in schemes {
                    put_u16(out, scheme.0);
                }
            }),
            Self::SupportedVersions(SupportedVersions::Offered(versions)) => put_prefixed(out, 1, |out| {
                for version in versions {
                    put_u16(out, *version);
                }
            }),
            Self::SupportedVersions(SupportedVersions::Selected(version)) => put_u16(out, *version),
            Self::PskKeyExchangeModes(modes) => put_vec8(out, modes),
            Self::KeyShare(KeyShare::Offered(entries)) => put_prefixed(out, 2, |out| {
                for entry in entries {
                    encode_key_share_entry(entry, out);
                }
            }),
            Self::KeyShare(KeyShare::Selected(entry)) => encode_key_share_entry(entry, out),
            Self::KeyShare(KeyShare::Retry(group)) => put_u16(out, group.0),
            Self::Unknown { data, .. } => out.extend_from_slice(data),
        }
    }
}

/// Decodes an `Extension extensions<0..2^16-1>` vector.
///
/// A type appearing twice is a decode error.
pub fn decode_extensions(data: &[u8], context: HandshakeType) -> Result<Vec<Extension>> {
    let mut reader = Reader::new(data);
    let mut extensions: Vec<Extension> = Vec::new();

    while !reader.is_empty() {
        let ext_type = reader.u16()?;
        let body = reader.vec16()?;

        if extensions.iter().any(|existing| existing.ext_type() == ext_type) {
            return Err(Error::Decode("duplicate extension type"));
        }

        extensions.push(Extension::decode(ext_type, body, context)?);
    }

    Ok(extensions)
}

/// Encodes an extension vector with its two byte length.
pub fn encode_extensions(extensions: &[Extension], out: &mut Vec<u8>) {
    put_prefixed(out, 2, |out| {
        for extension in extensions {
            extension.encode(out);
        }
    });
}

fn decode_server_name(reader: &mut Reader<'_>) -> Result<Option<String>> {
    if reader.is_empty() {
        return Ok(None);
    }

    let mut list = Reader::new(reader.vec16()?);
    let mut host_name = None;

    while !list.is_empty() {
        let name_type = list.u8()?;
        let name = list.vec16()?;

        if name_type != HOST_NAME_TYPE {
            return Err(Error::Decode("unknown server name type"));
        }
        if host_name.is_some() {
            return Err(Error::Decode("server_name lists more than one host name"));
        }

        let name = std::str::from_utf8(name).map_err(|_| Error::Decode("server name is not UTF-8"))?;
        host_name = Some(name.to_owned());
    }

    host_name
        .map(Some)
        .ok_or(Error::Decode("server_name carries no host name"))
}

fn decode_u16_list(data: &[u8]) -> Result<Vec<u16>> {
    if data.len() % 2 != 0 {
        return Err(Error::Decode("odd length in list of 16 bit values"));
    }

    let mut reader = Reader::new(data);
    let mut values = Vec::with_capacity(data.len() / 2);
    while !reader.is_empty() {
        values.push(reader.u16()?);
    }

    Ok(values)
}

fn decode_key_share_entry(reader: &mut Reader<'_>) -> Result<KeyShareEntry> {
    let group = NamedGroup(reader.u16()?);
    let key_exchange = reader.vec16()?;

    if key_exchange.is_empty() {
        return Err(Error::Decode("empty key_exchange"));
    }

    Ok(KeyShareEntry {
        group,
        key_exchange: key_exchange.to_vec(),
    })
}

fn encode_key_share_entry(entry: &KeyShareEntry, out: &mut Vec<u8>) {
    put_u16(out, entry.group.0);
    put_vec16(out, &entry.key_exchange);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(extension: &Extension, context: HandshakeType) {
        let mut out = Vec::new();
        extension.encode(&mut out);

        let mut reader = Reader::new(&out);
        let ext_type = reader.u16().unwrap();
        let body = reader.vec16().unwrap();

        assert_eq!(&Extension::decode(ext_type, body, context).unwrap(), extension);
    }

    #[test]
    fn server_name_wire_format() {
        let mut out = Vec::new();
        Extension::ServerName(Some("a.io".into())).encode(&mut out);
        assert_eq!(out, [0, 0, 0, 9, 0, 7, 0, 0, 4, b'a', b'.', b'i', b'o']);

        round_trip(&Extension::ServerName(None), HandshakeType::EncryptedExtensions);
    }

    #[test]
    fn context_selects_layout() {
        round_trip(
            &Extension::SupportedVersions(SupportedVersions::Offered(vec![0x0304, 0x0303])),
            HandshakeType::ClientHello,
        );
        round_trip(
            &Extension::SupportedVersions(SupportedVersions::Selected(TLS13_VERSION)),
            HandshakeType::ServerHello,
        );

        let entry = KeyShareEntry {
            group: NamedGroup::X25519,
            key_exchange: vec![9; 32],
        };
        round_trip(
            &Extension::KeyShare(KeyShare::Offered(vec![entry.clone()])),
            HandshakeType::ClientHello,
        );
        round_trip(&Extension::KeyShare(KeyShare::Selected(entry)), HandshakeType::ServerHello);
        round_trip(
            &Extension::KeyShare(KeyShare::Retry(NamedGroup(0x0017))),
            HandshakeType::ServerHello,
        );
    }

    #[test]
    fn unknown_extensions_are_kept_verbatim() {
        let data = [0x00, 0x0b, 0x00, 0x02, 0x01, 0x00, 0xff, 0x01, 0x00, 0x00];
        let extensions = decode_extensions(&data, HandshakeType::ClientHello).unwrap();

        assert_eq!(
            extensions,
            [
                Extension::Unknown {
                    ext_type: 0x000b,
                    data: vec![1, 0],
                },
                Extension::Unknown {
                    ext_type: 0xff01,
                    data: vec![],
                },
            ]
        );

        let mut out = Vec::new();
        encode_extensions(&extensions, &mut out);
        assert_eq!(&out[2..], &data);
    }

    #[test]
    fn malformed_lengths_are_rejected() {
        // Declared body length runs past the input.
        assert!(decode_extensions(&[0x00, 0x0a, 0x00, 0x08, 0x00, 0x02], HandshakeType::ClientHello).is_err());
        // Inner list length disagrees with the extension length.
        assert!(Extension::decode(EXT_SUPPORTED_GROUPS, &[0x00, 0x04, 0x00, 0x1d], HandshakeType::ClientHello).is_err());
        // Trailing byte after the selected version.
        assert!(Extension::decode(EXT_SUPPORTED_VERSIONS, &[3, 4, 0], HandshakeType::ServerHello).is_err());
    }

    #[test]
    fn duplicates_are_rejected() {
        let data = [0x00, 0x17, 0x00, 0x00, 0x00, 0x17, 0x00, 0x00];
        assert!(decode_extensions(&data, HandshakeType::ClientHello).is_err());
    }
}
