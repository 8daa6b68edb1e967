use futures::join;
use reactls::tls::extensions::{NamedGroup, SignatureScheme, TLS13_VERSION};
use reactls::tls::messages::{HandshakeMessage, HandshakeType};
use reactls::tls::record::{ContentType, RECORD_HEADER_LEN, RecordHeader};
use reactls::{Identity, KeyStore, MemoryTransport, Poller, ServerConfig, TlsSocket, Transport};

/// ClientHello record captured from a browser connecting to masterspline.eu.
const CAPTURED: &str = "16030100ea010000e60303e953c0de388c7582bc49d5b2ec467c9921c5db643c6607a4180e4d2a1a232b08\
2099576cce6e83c069dcd9984307e2befcb438863300f5585f2b95ce6ffe42f526000813021303130100ff010000950000\
0014001200000f6d617374657273706c696e652e6575000b000403000102000a000c000a001d0017001e00190018002300\
000016000000170000000d001e001c040305030603080708080809080a080b080408050806040105010601002b00030203\
04002d00020101003300260024001d0020cdbec4f35a48286e59b0e7eb2ee5a0510521457edfa1126923422e9238cdd50e";

fn captured() -> Vec<u8> {
    hex::decode(CAPTURED).expect("valid hex")
}

#[test]
fn captured_hello_decodes() {
    let record = captured();
    assert_eq!(record.len(), 239);

    let header = RecordHeader::decode(&record).expect("record header");
    assert_eq!(header.content_type, ContentType::Handshake);
    assert_eq!(header.legacy_version, 0x0301);
    assert_eq!(header.record_len(), record.len());

    let message = HandshakeMessage::decode(&record[RECORD_HEADER_LEN..]).expect("handshake message");
    assert_eq!(message.handshake_type(), HandshakeType::ClientHello);

    let HandshakeMessage::ClientHello(hello) = message else {
        panic!("not a ClientHello");
    };

    assert_eq!(hello.legacy_version, 0x0303);
    assert_eq!(hello.legacy_session_id.len(), 32);
    assert_eq!(hello.cipher_suites, vec![0x1302, 0x1303, 0x1301, 0x00ff]);
    assert_eq!(hello.legacy_compression_methods, vec![0]);
    assert_eq!(hello.server_name(), Some("masterspline.eu"));
    assert_eq!(hello.supported_versions(), Some(&[TLS13_VERSION][..]));
    assert_eq!(hello.supported_groups().expect("groups")[0], NamedGroup::X25519);
    assert!(hello.signature_algorithms().expect("schemes").contains(&SignatureScheme::ED25519));

    let shares = hello.key_shares().expect("key shares");
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].group, NamedGroup::X25519);
    assert_eq!(shares[0].key_exchange.len(), 32);

    // Extensions this crate does not interpret survive untouched.
    assert_eq!(hello.extensions.len(), 10);
}

#[test]
fn captured_hello_encodes_byte_for_byte() {
    let record = captured();
    let message = HandshakeMessage::decode(&record[RECORD_HEADER_LEN..]).expect("handshake message");

    assert_eq!(message.encode(), &record[RECORD_HEADER_LEN..]);
}

#[test]
fn truncated_hello_is_rejected() {
    let record = captured();

    for cut in [RECORD_HEADER_LEN + 4, RECORD_HEADER_LEN + 40, record.len() - 1] {
        assert!(HandshakeMessage::decode(&record[RECORD_HEADER_LEN..cut]).is_err());
    }
}

#[test]
fn server_answers_the_captured_hello_byte_by_byte() {
    let mut poller = Poller::new().expect("poller");
    let store = KeyStore::with_default(Identity::self_signed([0x55; 32], "masterspline.eu").expect("identity"));
    let config = ServerConfig::default();
    let record = captured();

    let (server, response) = poller
        .block_on(async {
            let (mut browser, server_end) = MemoryTransport::pair_with_chunk(1);

            join!(TlsSocket::server(server_end, &config, &store), async move {
                browser.write_all(&record).await.expect("send hello");

                let mut response = Vec::new();
                let mut buffer = [0u8; 512];
                loop {
                    let complete = RecordHeader::decode(&response)
                        .map(|header| response.len() >= header.record_len())
                        .unwrap_or(false);
                    if complete {
                        break;
                    }

                    let read = browser.read(&mut buffer).await.expect("read response");
                    assert_ne!(read, 0, "server closed early");
                    response.extend_from_slice(&buffer[..read]);
                }

                // Dropping the browser end aborts the handshake.
                response
            })
        })
        .expect("block_on");

    assert!(server.is_err());

    let header = RecordHeader::decode(&response).expect("record header");
    assert_eq!(header.content_type, ContentType::Handshake);

    let body = &response[RECORD_HEADER_LEN..header.record_len()];
    let HandshakeMessage::ServerHello(reply) = HandshakeMessage::decode(body).expect("server hello") else {
        panic!("not a ServerHello");
    };

    let record = captured();
    let HandshakeMessage::ClientHello(hello) = HandshakeMessage::decode(&record[RECORD_HEADER_LEN..]).expect("hello")
    else {
        panic!("not a ClientHello");
    };

    assert_eq!(reply.cipher_suite, 0x1302);
    assert_eq!(reply.selected_version(), Some(TLS13_VERSION));
    assert_eq!(reply.legacy_session_id_echo, hello.legacy_session_id);
    assert_eq!(reply.key_share().expect("key share").group, NamedGroup::X25519);
}
