use crate::error::{Error, Result};
use crate::reactor::Transport;
use crate::tls::alert::AlertDescription;
use crate::tls::cipher::CipherSuite;
use crate::tls::config::ClientConfig;
use crate::tls::extensions::{
    Extension, KeyShare, KeyShareEntry, NamedGroup, PSK_DHE_KE, SignatureScheme, SupportedVersions, TLS13_VERSION,
};
use crate::tls::handshake::{receive, unexpected, x25519_shared_secret};
use crate::tls::key_schedule::{KeySchedule, finished_verify_data, verify_finished};
use crate::tls::messages::{ClientHello, HandshakeMessage, LEGACY_VERSION, ServerHello};
use crate::tls::record_layer::{HandshakeState, RecordLayer};
use crate::tls::signature::{SERVER_CONTEXT, ed25519_public_key, verify_certificate_verify};
use crate::tls::transcript::Transcript;

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};

/// Runs the client side of the handshake on `layer`.
///
/// `server_name` goes out in the `server_name` extension when present.
pub(crate) async fn client_handshake<T: Transport>(
    layer: &mut RecordLayer<T>,
    config: &ClientConfig,
    server_name: Option<&str>,
) -> Result<()> {
    if config.cipher_suites.is_empty() {
        return Err(Error::Contract("client config offers no cipher suites"));
    }

    layer.set_max_change_cipher_spec(config.max_change_cipher_spec);

    match run(layer, config, server_name).await {
        Ok(()) => Ok(()),
        Err(err) => Err(layer.fail(err).await),
    }
}

async fn run<T: Transport>(layer: &mut RecordLayer<T>, config: &ClientConfig, server_name: Option<&str>) -> Result<()> {
    layer.set_state(HandshakeState::SendClientHello);

    let key_exchange = StaticSecret::random_from_rng(OsRng);
    let session_id = if config.middlebox_compat {
        let mut id = vec![0u8; 32];
        OsRng.fill_bytes(&mut id);
        id
    } else {
        Vec::new()
    };

    let client_hello = build_client_hello(config, server_name, &session_id, &key_exchange).encode();

    let mut transcript = Transcript::new();
    transcript.add(&client_hello);

    layer.queue_client_hello(&client_hello)?;
    layer.flush().await?;
    layer.set_state(HandshakeState::AwaitServerHello);

    let (message, raw) = receive(layer).await?;
    let HandshakeMessage::ServerHello(server_hello) = message else {
        return Err(unexpected("expected ServerHello"));
    };

    let suite = check_server_hello(&server_hello, config, &session_id)?;
    let shared_secret = x25519_shared_secret(&key_exchange, &server_key_share(&server_hello)?)?;

    transcript.add(&raw);
    transcript.select(suite.hash())?;
    debug!(?suite, "server hello accepted");

    let mut schedule = KeySchedule::new(suite.hash());
    let handshake_secrets = schedule.derive_handshake_secrets(&shared_secret, &transcript.current_hash()?)?;
    layer.install_handshake_keys(suite, &handshake_secrets)?;
    layer.set_state(HandshakeState::AwaitEncryptedExtensions);

    let (message, raw) = receive(layer).await?;
    let HandshakeMessage::EncryptedExtensions(extensions) = message else {
        return Err(unexpected("expected EncryptedExtensions"));
    };
    check_encrypted_extensions(&extensions)?;
    transcript.add(&raw);
    layer.set_state(HandshakeState::AwaitCertificate);

    let (message, raw) = receive(layer).await?;
    let HandshakeMessage::Certificate(certificate) = message else {
        return Err(unexpected("expected Certificate"));
    };
    if !certificate.request_context.is_empty() {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "server Certificate with a request context",
        ));
    }
    let Some(leaf) = certificate.entries.into_iter().next().map(|entry| entry.data) else {
        return Err(Error::handshake(AlertDescription::DecodeError, "server sent no certificate"));
    };
    check_pins(config, &leaf)?;
    ed25519_public_key(&leaf)?;
    transcript.add(&raw);
    layer.set_state(HandshakeState::AwaitCertificateVerify);

    let (message, raw) = receive(layer).await?;
    let HandshakeMessage::CertificateVerify(verify) = message else {
        return Err(unexpected("expected CertificateVerify"));
    };
    if verify.scheme != SignatureScheme::ED25519 {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "CertificateVerify uses a scheme that was not offered",
        ));
    }
    verify_certificate_verify(&leaf, SERVER_CONTEXT, &verify.signature, &transcript.current_hash()?)?;
    transcript.add(&raw);
    layer.set_state(HandshakeState::AwaitServerFinished);

    let (message, raw) = receive(layer).await?;
    let HandshakeMessage::Finished(verify_data) = message else {
        return Err(unexpected("expected Finished"));
    };
    let hash = suite.hash();
    if !verify_finished(hash, &handshake_secrets.server, &transcript.current_hash()?, &verify_data)? {
        return Err(Error::handshake(AlertDescription::DecryptError, "server Finished mismatch"));
    }
    transcript.add(&raw);

    let application_secrets = schedule.derive_application_secrets(&transcript.current_hash()?)?;
    layer.set_state(HandshakeState::SendClientFinished);

    if config.middlebox_compat {
        layer.queue_change_cipher_spec();
    }

    let verify_data = finished_verify_data(hash, &handshake_secrets.client, &transcript.current_hash()?)?;
    layer.queue_handshake(&HandshakeMessage::Finished(verify_data).encode())?;
    layer.flush().await?;

    layer.install_application_keys(application_secrets)
}

fn build_client_hello(
    config: &ClientConfig,
    server_name: Option<&str>,
    session_id: &[u8],
    key_exchange: &StaticSecret,
) -> HandshakeMessage {
    let mut random = [0u8; 32];
    OsRng.fill_bytes(&mut random);

    let mut extensions = Vec::with_capacity(6);
    if let Some(name) = server_name {
        extensions.push(Extension::ServerName(Some(name.to_owned())));
    }
    extensions.extend([
        Extension::SupportedVersions(SupportedVersions::Offered(vec![TLS13_VERSION])),
        Extension::SupportedGroups(vec![NamedGroup::X25519]),
        Extension::SignatureAlgorithms(vec![SignatureScheme::ED25519]),
        Extension::PskKeyExchangeModes(vec![PSK_DHE_KE]),
        Extension::KeyShare(KeyShare::Offered(vec![KeyShareEntry {
            group: NamedGroup::X25519,
            key_exchange: PublicKey::from(key_exchange).as_bytes().to_vec(),
        }])),
    ]);

    HandshakeMessage::ClientHello(ClientHello {
        legacy_version: LEGACY_VERSION,
        random,
        legacy_session_id: session_id.to_vec(),
        cipher_suites: config.cipher_suites.iter().map(|suite| suite.to_u16()).collect(),
        legacy_compression_methods: vec![0],
        extensions,
    })
}

/// Validates ServerHello against what was offered and returns the suite.
fn check_server_hello(hello: &ServerHello, config: &ClientConfig, session_id: &[u8]) -> Result<CipherSuite> {
    if hello.is_hello_retry_request() {
        return Err(Error::handshake(
            AlertDescription::HandshakeFailure,
            "HelloRetryRequest is not supported",
        ));
    }

    if hello.legacy_version != LEGACY_VERSION || hello.selected_version() != Some(TLS13_VERSION) {
        return Err(Error::handshake(
            AlertDescription::ProtocolVersion,
            "server did not select TLS 1.3",
        ));
    }

    if hello.legacy_session_id_echo != session_id {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "legacy_session_id_echo does not match",
        ));
    }

    if hello.legacy_compression_method != 0 {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "non-null compression method",
        ));
    }

    CipherSuite::from_u16(hello.cipher_suite)
        .filter(|suite| config.cipher_suites.contains(suite))
        .ok_or(Error::handshake(
            AlertDescription::IllegalParameter,
            "server selected a cipher suite that was not offered",
        ))
}

fn server_key_share(hello: &ServerHello) -> Result<Vec<u8>> {
    let Some(entry) = hello.key_share() else {
        return Err(Error::handshake(
            AlertDescription::MissingExtension,
            "ServerHello without key_share",
        ));
    };

    if entry.group != NamedGroup::X25519 {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "server key share uses a group that was not offered",
        ));
    }

    Ok(entry.key_exchange.clone())
}

/// Extensions that belong in ServerHello must not show up here.
fn check_encrypted_extensions(extensions: &[Extension]) -> Result<()> {
    let misplaced = extensions.iter().any(|extension| {
        matches!(
            extension,
            Extension::SupportedVersions(_) | Extension::KeyShare(_) | Extension::PskKeyExchangeModes(_)
        )
    });

    if misplaced {
        return Err(Error::handshake(
            AlertDescription::IllegalParameter,
            "EncryptedExtensions carries a ServerHello extension",
        ));
    }

    Ok(())
}

fn check_pins(config: &ClientConfig, leaf: &[u8]) -> Result<()> {
    if config.pinned_certificates.is_empty() || config.pinned_certificates.iter().any(|pin| pin == leaf) {
        return Ok(());
    }

    Err(Error::handshake(
        AlertDescription::BadCertificate,
        "server certificate is not pinned",
    ))
}
