use crate::error::{Error, Result};
use crate::reactor::Transport;
use crate::tls::alert::AlertDescription;
use crate::tls::cipher::CipherSuite;
use crate::tls::config::ServerConfig;
use crate::tls::extensions::{
    Extension, KeyShare, KeyShareEntry, NamedGroup, SignatureScheme, SupportedVersions, TLS13_VERSION,
};
use crate::tls::handshake::{receive, unexpected, x25519_shared_secret};
use crate::tls::key_schedule::{KeySchedule, finished_verify_data, verify_finished};
use crate::tls::key_store::{Identity, KeyStore};
use crate::tls::messages::{
    Certificate, CertificateEntry, CertificateVerify, ClientHello, HandshakeMessage, LEGACY_VERSION, ServerHello,
};
use crate::tls::record_layer::{HandshakeState, RecordLayer};
use crate::tls::signature::{SERVER_CONTEXT, sign_certificate_verify};
use crate::tls::transcript::Transcript;

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};

/// Parameters picked from a ClientHello.
#[derive(Debug)]
struct Negotiated<'a> {
    suite: CipherSuite,
    client_share: &'a [u8],
    identity: &'a Identity,
}

/// Runs the server side of the handshake on `layer`, presenting the
/// identity `key_store` holds for the requested server name.
pub(crate) async fn server_handshake<T: Transport>(
    layer: &mut RecordLayer<T>,
    config: &ServerConfig,
    key_store: &KeyStore,
) -> Result<()> {
    if key_store.is_empty() {
        return Err(Error::Contract("server key store holds no identity"));
    }
    if config.cipher_suites.is_empty() {
        return Err(Error::Contract("server config accepts no cipher suites"));
    }

    layer.set_max_change_cipher_spec(config.max_change_cipher_spec);

    match run(layer, config, key_store).await {
        Ok(()) => Ok(()),
        Err(err) => Err(layer.fail(err).await),
    }
}

async fn run<T: Transport>(layer: &mut RecordLayer<T>, config: &ServerConfig, key_store: &KeyStore) -> Result<()> {
    layer.set_state(HandshakeState::RecvClientHello);

    let (message, raw) = receive(layer).await?;
    let HandshakeMessage::ClientHello(client_hello) = message else {
        return Err(unexpected("expected ClientHello"));
    };

    let negotiated = negotiate(&client_hello, config, key_store)?;
    let suite = negotiated.suite;
    let chain = negotiated.identity.certificate_chain();
    if chain.is_empty() {
        return Err(Error::handshake(
            AlertDescription::InternalError,
            "server identity has no certificate",
        ));
    }

    let key_exchange = StaticSecret::random_from_rng(OsRng);
    let shared_secret = x25519_shared_secret(&key_exchange, negotiated.client_share)?;

    debug!(
        ?suite,
        server_name = client_hello.server_name(),
        "client hello accepted"
    );

    let mut transcript = Transcript::new();
    transcript.add(&raw);
    layer.set_state(HandshakeState::SendServerFlight);

    let server_hello = build_server_hello(&client_hello, suite, &key_exchange).encode();
    transcript.add(&server_hello);
    transcript.select(suite.hash())?;
    layer.queue_handshake(&server_hello)?;

    if config.middlebox_compat && !client_hello.legacy_session_id.is_empty() {
        layer.queue_change_cipher_spec();
    }

    let mut schedule = KeySchedule::new(suite.hash());
    let handshake_secrets = schedule.derive_handshake_secrets(&shared_secret, &transcript.current_hash()?)?;
    layer.install_handshake_keys(suite, &handshake_secrets)?;

    // Acknowledge server_name with an empty extension when one was used.
    let mut extensions = Vec::new();
    if client_hello.server_name().is_some() {
        extensions.push(Extension::ServerName(None));
    }
    send(layer, &mut transcript, HandshakeMessage::EncryptedExtensions(extensions))?;

    let certificate = Certificate {
        request_context: Vec::new(),
        entries: chain
            .iter()
            .map(|data| CertificateEntry {
                data: data.clone(),
                extensions: Vec::new(),
            })
            .collect(),
    };
    send(layer, &mut transcript, HandshakeMessage::Certificate(certificate))?;

    let signature = sign_certificate_verify(
        negotiated.identity.signing_key(),
        SERVER_CONTEXT,
        &transcript.current_hash()?,
    );
    let verify = CertificateVerify {
        scheme: SignatureScheme::ED25519,
        signature,
    };
    send(layer, &mut transcript, HandshakeMessage::CertificateVerify(verify))?;

    let hash = suite.hash();
    let verify_data = finished_verify_data(hash, &handshake_secrets.server, &transcript.current_hash()?)?;
    send(layer, &mut transcript, HandshakeMessage::Finished(verify_data))?;
    layer.flush().await?;

    let application_secrets = schedule.derive_application_secrets(&transcript.current_hash()?)?;
    layer.set_state(HandshakeState::AwaitClientFinished);

    let (message, _) = receive(layer).await?;
    let HandshakeMessage::Finished(verify_data) = message else {
        return Err(unexpected("expected client Finished"));
    };
    if !verify_finished(hash, &handshake_secrets.client, &transcript.current_hash()?, &verify_data)? {
        return Err(Error::handshake(AlertDescription::DecryptError, "client Finished mismatch"));
    }

    layer.install_application_keys(application_secrets)
}

/// Queues `message` and adds it to the transcript.
fn send<T: Transport>(layer: &mut RecordLayer<T>, transcript: &mut Transcript, message: HandshakeMessage) -> Result<()> {
    let encoded = message.encode();
    transcript.add(&encoded);
    layer.queue_handshake(&encoded)
}

/// Picks suite, key share and identity for `hello`, or explains why the
/// handshake cannot go on.
fn negotiate<'a>(hello: &'a ClientHello, config: &ServerConfig, key_store: &'a KeyStore) -> Result<Negotiated<'a>> {
    let Some(versions) = hello.supported_versions() else {
        return Err(Error::handshake(
            AlertDescription::ProtocolVersion,
            "client does not offer TLS 1.3",
        ));
    };
    if !versions.contains(&TLS13_VERSION) {
        return Err(Error::handshake(
            AlertDescription::ProtocolVersion,
            "client does not offer TLS 1.3",
        ));
    }

    if hello.legacy_compression_methods != [0] {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "compression methods other than null",
        ));
    }

    let Some(suite) = config
        .cipher_suites
        .iter()
        .copied()
        .find(|suite| hello.cipher_suites.contains(&suite.to_u16()))
    else {
        return Err(Error::handshake(
            AlertDescription::HandshakeFailure,
            "no cipher suite in common",
        ));
    };

    let Some(schemes) = hello.signature_algorithms() else {
        return Err(Error::handshake(
            AlertDescription::MissingExtension,
            "ClientHello without signature_algorithms",
        ));
    };
    if !schemes.contains(&SignatureScheme::ED25519) {
        return Err(Error::handshake(
            AlertDescription::HandshakeFailure,
            "client does not accept Ed25519 signatures",
        ));
    }

    let Some(shares) = hello.key_shares() else {
        return Err(Error::handshake(
            AlertDescription::MissingExtension,
            "ClientHello without key_share",
        ));
    };
    let Some(client_share) = shares.iter().find(|entry| entry.group == NamedGroup::X25519) else {
        // Asking for another share would need a HelloRetryRequest.
        return Err(Error::handshake(
            AlertDescription::HandshakeFailure,
            "client sent no X25519 key share",
        ));
    };

    let Some(identity) = key_store.lookup(hello.server_name()) else {
        return Err(Error::handshake(
            AlertDescription::UnrecognizedName,
            "no identity for the requested server name",
        ));
    };

    Ok(Negotiated {
        suite,
        client_share: &client_share.key_exchange,
        identity,
    })
}

fn build_server_hello(client_hello: &ClientHello, suite: CipherSuite, key_exchange: &StaticSecret) -> HandshakeMessage {
    let mut random = [0u8; 32];
    OsRng.fill_bytes(&mut random);

    HandshakeMessage::ServerHello(ServerHello {
        legacy_version: LEGACY_VERSION,
        random,
        legacy_session_id_echo: client_hello.legacy_session_id.clone(),
        cipher_suite: suite.to_u16(),
        legacy_compression_method: 0,
        extensions: vec![
            Extension::SupportedVersions(SupportedVersions::Selected(TLS13_VERSION)),
            Extension::KeyShare(KeyShare::Selected(KeyShareEntry {
                group: NamedGroup::X25519,
                key_exchange: PublicKey::from(key_exchange).as_bytes().to_vec(),
            })),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::extensions::PSK_DHE_KE;

    fn client_hello() -> ClientHello {
        ClientHello {
            legacy_version: LEGACY_VERSION,
            random: [1; 32],
            legacy_session_id: vec![2; 32],
            cipher_suites: vec![0x1301, 0x1303],
            legacy_compression_methods: vec![0],
            extensions: vec![
                Extension::ServerName(Some("alpha.test".into())),
                Extension::SupportedVersions(SupportedVersions::Offered(vec![TLS13_VERSION])),
                Extension::SupportedGroups(vec![NamedGroup::X25519]),
                Extension::SignatureAlgorithms(vec![SignatureScheme::ED25519]),
                Extension::PskKeyExchangeModes(vec![PSK_DHE_KE]),
                Extension::KeyShare(KeyShare::Offered(vec![KeyShareEntry {
                    group: NamedGroup::X25519,
                    key_exchange: vec![4; 32],
                }])),
            ],
        }
    }

    fn alert_of(err: Error) -> AlertDescription {
        match err {
            Error::Handshake { alert, .. } => alert,
            other => panic!("unexpected error {other}"),
        }
    }

    fn store() -> KeyStore {
        let mut store = KeyStore::new();
        store.add("alpha.test", Identity::self_signed([1; 32], "alpha.test").expect("identity"));
        store
    }

    #[test]
    fn server_preference_decides_the_suite() {
        let hello = client_hello();
        let store = store();

        let config = ServerConfig::default();
        assert_eq!(
            negotiate(&hello, &config, &store).unwrap().suite,
            CipherSuite::Chacha20Poly1305Sha256
        );

        let config = ServerConfig::default().cipher_suites(&[CipherSuite::Aes256GcmSha384]);
        assert_eq!(
            alert_of(negotiate(&hello, &config, &store).unwrap_err()),
            AlertDescription::HandshakeFailure
        );
    }

    #[test]
    fn missing_requirements_are_reported() {
        let store = store();
        let config = ServerConfig::default();

        let mut no_tls13 = client_hello();
        no_tls13.extensions.remove(1);
        assert_eq!(
            alert_of(negotiate(&no_tls13, &config, &store).unwrap_err()),
            AlertDescription::ProtocolVersion
        );

        let mut other_name = client_hello();
        other_name.extensions[0] = Extension::ServerName(Some("beta.test".into()));
        assert_eq!(
            alert_of(negotiate(&other_name, &config, &store).unwrap_err()),
            AlertDescription::UnrecognizedName
        );

        let mut p256_only = client_hello();
        p256_only.extensions[5] = Extension::KeyShare(KeyShare::Offered(vec![KeyShareEntry {
            group: NamedGroup(0x0017),
            key_exchange: vec![4; 65],
        }]));
        assert_eq!(
            alert_of(negotiate(&p256_only, &config, &store).unwrap_err()),
            AlertDescription::HandshakeFailure
        );
    }

    #[test]
    fn server_hello_echoes_the_session() {
        let hello = client_hello();
        let secret = StaticSecret::from([6u8; 32]);

        let HandshakeMessage::ServerHello(reply) = build_server_hello(&hello, CipherSuite::Aes128GcmSha256, &secret)
        else {
            panic!("not a ServerHello");
        };

        assert_eq!(reply.legacy_session_id_echo, hello.legacy_session_id);
        assert_eq!(reply.selected_version(), Some(TLS13_VERSION));
        assert_eq!(reply.cipher_suite, 0x1301);
        assert!(!reply.is_hello_retry_request());
    }
}
