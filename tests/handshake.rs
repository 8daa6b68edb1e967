use futures::join;
use reactls::tls::AlertDescription;
use reactls::{
    CipherSuite, ClientConfig, Error, ErrorKind, HandshakeState, Identity, KeyStore, MemoryTransport, Poller,
    ServerConfig, TlsSocket,
};

fn key_store() -> KeyStore {
    KeyStore::with_default(Identity::self_signed([0x11; 32], "localhost").expect("identity"))
}

async fn handshake(
    chunk: usize,
    client_config: &ClientConfig,
    server_config: &ServerConfig,
    key_store: &KeyStore,
    server_name: Option<&str>,
) -> (
    reactls::Result<TlsSocket<MemoryTransport>>,
    reactls::Result<TlsSocket<MemoryTransport>>,
) {
    let (client_end, server_end) = MemoryTransport::pair_with_chunk(chunk);

    join!(
        TlsSocket::client(client_end, client_config, server_name),
        TlsSocket::server(server_end, server_config, key_store),
    )
}

#[test]
fn every_suite_agrees_on_application_secrets() {
    let mut poller = Poller::new().expect("poller");
    let store = key_store();

    for suite in CipherSuite::ALL {
        let client_config = ClientConfig::default().cipher_suites(&[suite]);

        let (client, server) = poller
            .block_on(handshake(
                usize::MAX,
                &client_config,
                &ServerConfig::default(),
                &store,
                Some("localhost"),
            ))
            .expect("block_on");

        let client = client.expect("client handshake");
        let server = server.expect("server handshake");

        let client_layer = client.record_layer();
        let server_layer = server.record_layer();

        assert_eq!(client_layer.state(), HandshakeState::ApplicationData);
        assert_eq!(server_layer.state(), HandshakeState::ApplicationData);
        assert_eq!(client_layer.cipher_suite(), Some(suite));
        assert_eq!(server_layer.cipher_suite(), Some(suite));

        let secrets = client_layer.application_secrets().expect("client secrets");
        assert_eq!(Some(secrets), server_layer.application_secrets());
        assert_eq!(secrets.client.len(), suite.hash().output_len());
        assert_ne!(secrets.client, secrets.server);
    }
}

#[test]
fn data_flows_over_a_chunked_transport() {
    let mut poller = Poller::new().expect("poller");
    let store = key_store();

    poller
        .block_on(async {
            let (client, server) =
                handshake(3, &ClientConfig::default(), &ServerConfig::default(), &store, None).await;
            let mut client = client.expect("client handshake");
            let mut server = server.expect("server handshake");

            let request: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();

            let (sent, received) = join!(client.write_all(&request), async {
                let mut buffer = vec![0u8; request.len()];
                server.read_exact(&mut buffer).await.map(|()| buffer)
            });
            sent.expect("client write");
            assert_eq!(received.expect("server read"), request);

            server.write_all(b"done").await.expect("server write");
            server.shutdown().await.expect("server shutdown");

            let mut reply = [0u8; 16];
            let read = client.read(&mut reply).await.expect("client read");
            assert_eq!(&reply[..read], b"done");
            assert_eq!(client.read(&mut reply).await.expect("read after close"), 0);
        })
        .expect("block_on");
}

#[test]
fn handshake_without_middlebox_compatibility() {
    let mut poller = Poller::new().expect("poller");
    let store = key_store();

    let (client, server) = poller
        .block_on(handshake(
            1,
            &ClientConfig::default().middlebox_compat(false),
            &ServerConfig::default().middlebox_compat(false),
            &store,
            Some("localhost"),
        ))
        .expect("block_on");

    assert!(client.is_ok());
    assert!(server.is_ok());
}

#[test]
fn unpinned_server_is_refused() {
    let mut poller = Poller::new().expect("poller");
    let store = key_store();
    let other = Identity::self_signed([0x22; 32], "localhost").expect("identity");
    let client_config = ClientConfig::default().pin_certificate(other.leaf().expect("leaf").to_vec());

    let (client, server) = poller
        .block_on(handshake(
            usize::MAX,
            &client_config,
            &ServerConfig::default(),
            &store,
            None,
        ))
        .expect("block_on");

    let client_err = client.err().expect("client must fail");
    assert!(matches!(
        client_err,
        Error::Handshake {
            alert: AlertDescription::BadCertificate,
            ..
        }
    ));

    let server_err = server.err().expect("server must fail");
    assert!(matches!(server_err, Error::PeerAlert(AlertDescription::BadCertificate)));
    assert_eq!(server_err.kind(), ErrorKind::HandshakeProtocol);
}

#[test]
fn pinned_server_is_accepted() {
    let mut poller = Poller::new().expect("poller");
    let identity = Identity::self_signed([0x33; 32], "pinned.test").expect("identity");
    let client_config = ClientConfig::default().pin_certificate(identity.leaf().expect("leaf").to_vec());

    let mut store = KeyStore::new();
    store.add("pinned.test", identity);

    let (client, server) = poller
        .block_on(handshake(
            usize::MAX,
            &client_config,
            &ServerConfig::default(),
            &store,
            Some("pinned.test"),
        ))
        .expect("block_on");

    assert!(client.is_ok());
    assert!(server.is_ok());
}

#[test]
fn unknown_server_name_is_reported_to_the_client() {
    let mut poller = Poller::new().expect("poller");
    let mut store = KeyStore::new();
    store.add("alpha.test", Identity::self_signed([0x44; 32], "alpha.test").expect("identity"));

    let (client, server) = poller
        .block_on(handshake(
            usize::MAX,
            &ClientConfig::default(),
            &ServerConfig::default(),
            &store,
            Some("beta.test"),
        ))
        .expect("block_on");

    assert!(matches!(
        server.err().expect("server must fail"),
        Error::Handshake {
            alert: AlertDescription::UnrecognizedName,
            ..
        }
    ));
    assert!(matches!(
        client.err().expect("client must fail"),
        Error::PeerAlert(AlertDescription::UnrecognizedName)
    ));
}

#[test]
fn no_common_suite_fails_both_sides() {
    let mut poller = Poller::new().expect("poller");
    let store = key_store();

    let (client, server) = poller
        .block_on(handshake(
            usize::MAX,
            &ClientConfig::default().cipher_suites(&[CipherSuite::Aes128GcmSha256]),
            &ServerConfig::default().cipher_suites(&[CipherSuite::Chacha20Poly1305Sha256]),
            &store,
            None,
        ))
        .expect("block_on");

    assert!(matches!(
        server.err().expect("server must fail"),
        Error::Handshake {
            alert: AlertDescription::HandshakeFailure,
            ..
        }
    ));
    assert!(matches!(
        client.err().expect("client must fail"),
        Error::PeerAlert(AlertDescription::HandshakeFailure)
    ));
}

#[test]
fn key_update_round_trip() {
    let mut poller = Poller::new().expect("poller");
    let store = key_store();

    poller
        .block_on(async {
            let (client, server) =
                handshake(64, &ClientConfig::default(), &ServerConfig::default(), &store, None).await;
            let mut client = client.expect("client handshake");
            let mut server = server.expect("server handshake");

            server.update_keys(true).await.expect("update");
            server.write_all(b"fresh keys").await.expect("write");

            let mut buffer = [0u8; 10];
            client.read_exact(&mut buffer).await.expect("read");
            assert_eq!(&buffer, b"fresh keys");

            client.write_all(b"ack").await.expect("write");
            let mut ack = [0u8; 3];
            server.read_exact(&mut ack).await.expect("read");
            assert_eq!(&ack, b"ack");
        })
        .expect("block_on");
}
