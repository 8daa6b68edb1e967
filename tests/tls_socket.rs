use std::io::Write;
use std::net::TcpStream as StdTcpStream;

use futures::join;
use reactls::{
    ClientConfig, Handle, Identity, KeyStore, Poller, ServerConfig, TaskGroup, TlsListener, TlsSocket,
};

/// Listener on loopback plus a blocking peer that connected but never speaks.
fn silent_peer(handle: &Handle) -> (TlsListener, StdTcpStream) {
    let listener = TlsListener::bind(handle, "127.0.0.1:0".parse().expect("address"), ServerConfig::default())
        .expect("bind");
    let peer = StdTcpStream::connect(listener.local_addr().expect("local addr")).expect("connect");

    (listener, peer)
}

#[test]
fn loopback_tls_echo() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();

    let identity = Identity::self_signed([0x66; 32], "localhost").expect("identity");
    let client_config = ClientConfig::default().pin_certificate(identity.leaf().expect("leaf").to_vec());
    let store = KeyStore::with_default(identity);

    let mut listener = TlsListener::bind(&handle, "127.0.0.1:0".parse().expect("address"), ServerConfig::default())
        .expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let addresses = TlsSocket::resolve("127.0.0.1", port).expect("resolve");

    poller
        .block_on(async move {
            let (accepted, connected) = join!(
                listener.accept(&store),
                TlsSocket::connect(&handle, &addresses, Some("localhost"), &client_config),
            );

            let (mut server, peer) = accepted.expect("accept");
            let mut client = connected.expect("connect");
            assert_eq!(client.record_layer().get_ref().local_addr().expect("local"), peer);
            assert_eq!(client.peer_addr().expect("peer").port(), port);

            let payload = vec![0xa5u8; 50_000];
            let (sent, echoed) = join!(client.write_all(&payload), async {
                let mut buffer = vec![0u8; payload.len()];
                server.read_exact(&mut buffer).await?;
                server.write_all(&buffer).await
            });
            sent.expect("client write");
            echoed.expect("server echo");

            let mut back = vec![0u8; payload.len()];
            client.read_exact(&mut back).await.expect("client read");
            assert_eq!(back, payload);

            client.shutdown().await.expect("client shutdown");
            let mut rest = [0u8; 1];
            assert_eq!(server.read(&mut rest).await.expect("server read"), 0);
        })
        .expect("block_on");
}

#[test]
fn connect_to_a_closed_port_fails() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();

    let port = {
        let vacant = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        vacant.local_addr().expect("vacant addr").port()
    };

    let addresses = TlsSocket::resolve("127.0.0.1", port).expect("resolve");

    let result = poller
        .block_on(async move {
            TlsSocket::connect(&handle, &addresses, None, &ClientConfig::default())
                .await
                .map(|_| ())
        })
        .expect("block_on");

    assert_eq!(result.expect_err("nothing listens").kind(), reactls::ErrorKind::Transport);
}

#[test]
fn aborting_a_handshake_releases_its_descriptor() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let store = KeyStore::with_default(Identity::self_signed([0x77; 32], "localhost").expect("identity"));
    let (mut listener, mut peer) = silent_peer(&handle);

    let task = handle.spawn(async move { listener.accept(&store).await.map(|_| ()) });

    // The server now waits for a ClientHello that never comes.
    poller.block_on(async {}).expect("block_on");
    assert!(!task.is_finished());
    assert!(handle.registered_descriptors() >= 1);

    task.abort();
    assert_eq!(handle.registered_descriptors(), 0);
    assert_eq!(handle.task_count(), 0);

    // Late bytes from the peer must not resume anything.
    let _ = peer.write_all(&[0x16, 0x03, 0x01]);
    poller.run().expect("run");
    assert!(poller.block_on(task).expect("block_on").is_none());
}

#[test]
fn dropping_the_group_ends_a_pending_handshake() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();
    let store = KeyStore::with_default(Identity::self_signed([0x78; 32], "localhost").expect("identity"));
    let (mut listener, _peer) = silent_peer(&handle);

    let connections = TaskGroup::new(&handle);
    connections.spawn(async move {
        let _ = listener.accept(&store).await;
    });

    poller.block_on(async {}).expect("block_on");
    assert_eq!(connections.len(), 1);

    drop(connections);
    assert_eq!(handle.registered_descriptors(), 0);
    assert_eq!(handle.task_count(), 0);
    poller.run().expect("run");
}

#[test]
fn connect_needs_an_address() {
    let mut poller = Poller::new().expect("poller");
    let handle = poller.handle();

    let result = poller
        .block_on(async move {
            TlsSocket::connect(&handle, &[], None, &ClientConfig::default())
                .await
                .map(|_| ())
        })
        .expect("block_on");

    assert_eq!(result.expect_err("no address").kind(), reactls::ErrorKind::Transport);
}
