//! End-to-end tests for the session controller over loopback sockets.
//!
//! Each test drives a real [`SessionController`] and a real peer socket and
//! observes the results the way a front end would: through the update queue
//! and the session's counters and registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use netassist::application::outbound::NO_CONNECTION_STATUS;
use netassist::application::session::{
    PreparedSend, SendOutcome, SessionController, SessionError, SessionState,
};
use netassist::infrastructure::ui_bridge::{ChannelSink, StatusLevel, UiUpdate};
use netassist_core::{ProtocolKind, ReceiveSettings, SendSettings};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn make_session() -> (SessionController, UnboundedReceiver<UiUpdate>) {
    let (sink, rx) = ChannelSink::new();
    (SessionController::new(Arc::new(sink)), rx)
}

/// Waits for the first update matching `pred`, skipping the others.
async fn next_matching(
    rx: &mut UnboundedReceiver<UiUpdate>,
    pred: impl Fn(&UiUpdate) -> bool,
) -> UiUpdate {
    timeout(WAIT, async {
        loop {
            let update = rx.recv().await.expect("update queue closed");
            if pred(&update) {
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for update")
}

/// Polls until the registry holds exactly `n` connections.
async fn wait_for_connections(session: &SessionController, n: usize) {
    timeout(WAIT, async {
        while session.registry().count().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

async fn start_tcp_server(session: &mut SessionController) -> String {
    let local = assert_ok!(
        session
            .connect(ProtocolKind::TcpServer, "127.0.0.1", "0")
            .await
    );
    local.port().to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tcp_client_round_trip_counts_received_bytes() {
    // Arrange: a plain Tokio listener plays the remote server.
    let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port().to_string();
    let (mut session, mut rx) = make_session();

    // Act
    assert_ok!(session.connect(ProtocolKind::TcpClient, "127.0.0.1", &port).await);
    let (mut peer, _) = server.accept().await.unwrap();
    peer.write_all(b"ping").await.unwrap();

    // Assert
    let received = next_matching(&mut rx, |u| matches!(u, UiUpdate::Received(_))).await;
    assert_eq!(received, UiUpdate::Received("ping".to_string()));
    timeout(WAIT, async {
        while session.counters().received() < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(session.counters().received(), 4);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_tcp_client_connect_reports_success_and_local_endpoint() {
    let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port().to_string();
    let (mut session, mut rx) = make_session();

    let local = assert_ok!(session.connect(ProtocolKind::TcpClient, "127.0.0.1", &port).await);

    let status = next_matching(&mut rx, |u| matches!(u, UiUpdate::Status(_))).await;
    let UiUpdate::Status(msg) = status else { unreachable!() };
    assert_eq!(msg.level, StatusLevel::Success);
    assert_eq!(msg.text, "TCP client connection succeeds");
    let endpoint = next_matching(&mut rx, |u| matches!(u, UiUpdate::LocalEndpoint { .. })).await;
    assert_eq!(
        endpoint,
        UiUpdate::LocalEndpoint {
            address: "127.0.0.1".to_string(),
            port: local.port().to_string(),
        }
    );
}

#[tokio::test]
async fn test_tcp_server_disconnect_with_three_peers_empties_registry() {
    // Arrange
    let (mut session, mut rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let mut peers = Vec::new();
    for _ in 0..3 {
        peers.push(
            TcpStream::connect(format!("127.0.0.1:{port}"))
                .await
                .unwrap(),
        );
        next_matching(&mut rx, |u| {
            matches!(u, UiUpdate::Status(m) if m.text.starts_with("new connection: "))
        })
        .await;
    }
    wait_for_connections(&session, 3).await;

    // Act
    assert_ok!(session.disconnect().await);

    // Assert
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.registry().is_empty().await);
    let waiting = next_matching(&mut rx, |u| {
        matches!(u, UiUpdate::Status(m) if m.text == "Waiting connection")
    })
    .await;
    assert!(matches!(waiting, UiUpdate::Status(_)));
    // Every peer sees end-of-stream.
    for peer in peers.iter_mut() {
        let mut buf = [0u8; 16];
        let n = timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap_or(0);
        assert_eq!(n, 0);
    }
}

#[tokio::test]
async fn test_tcp_server_peer_disconnect_removes_only_that_peer() {
    // Arrange
    let (mut session, mut rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let first = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    let _second = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    wait_for_connections(&session, 2).await;
    let first_addr = first.local_addr().unwrap();

    // Act
    drop(first);

    // Assert
    let closed = next_matching(&mut rx, |u| {
        matches!(u, UiUpdate::Status(m) if m.text.starts_with("connection closed: "))
    })
    .await;
    let UiUpdate::Status(msg) = closed else { unreachable!() };
    assert_eq!(msg.text, format!("connection closed: {first_addr}"));
    wait_for_connections(&session, 1).await;
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_send_once_to_many_connections_counts_n_times_m() {
    // Arrange: 4 accepted connections, 6-byte payload.
    let (mut session, _rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let mut peers = Vec::new();
    for _ in 0..4 {
        peers.push(TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap());
    }
    wait_for_connections(&session, 4).await;

    // Act
    let outcome = assert_ok!(session.send("abcdef", &SendSettings::default()).await);

    // Assert
    assert_eq!(outcome, SendOutcome::Sent(24));
    assert_eq!(session.counters().sent(), 24);
    for peer in peers.iter_mut() {
        let mut buf = [0u8; 6];
        timeout(WAIT, peer.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"abcdef");
    }
}

#[tokio::test]
async fn test_hex_send_decodes_and_invalid_hex_sends_nothing() {
    // Arrange
    let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port().to_string();
    let (mut session, mut rx) = make_session();
    assert_ok!(session.connect(ProtocolKind::TcpClient, "127.0.0.1", &port).await);
    let (mut peer, _) = server.accept().await.unwrap();
    let hex = SendSettings {
        send_hex: true,
        append_crlf: true,
        ..SendSettings::default()
    };

    // Act
    let sent = assert_ok!(session.send("48 65 6C 6C 6F", &hex).await);
    let invalid = session.send("ZZ", &hex).await;

    // Assert
    assert_eq!(sent, SendOutcome::Sent(5));
    let mut buf = [0u8; 5];
    timeout(WAIT, peer.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"Hello");

    let err = assert_err!(invalid);
    assert!(matches!(err, SessionError::InvalidHexInput(_)));
    assert_eq!(session.counters().sent(), 5);
    let status = next_matching(&mut rx, |u| {
        matches!(u, UiUpdate::Status(m) if m.level == StatusLevel::Error)
    })
    .await;
    assert!(matches!(status, UiUpdate::Status(_)));
}

#[tokio::test]
async fn test_cyclic_send_self_terminates_when_connections_close() {
    // Arrange
    let (mut session, mut rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let mut peer = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    wait_for_connections(&session, 1).await;
    let cyclic = SendSettings::default().cyclic("100");

    // Act
    let started = assert_ok!(session.send("tick", &cyclic).await);
    let mut buf = [0u8; 4];
    timeout(WAIT, peer.read_exact(&mut buf)).await.unwrap().unwrap();
    session.registry().close_all().await;

    // Assert
    assert_eq!(started, SendOutcome::CyclicStarted);
    let status = next_matching(&mut rx, |u| {
        matches!(u, UiUpdate::Status(m) if m.text == NO_CONNECTION_STATUS)
    })
    .await;
    assert!(matches!(status, UiUpdate::Status(m) if m.level == StatusLevel::Warning));
    next_matching(&mut rx, |u| matches!(u, UiUpdate::CyclicStopped)).await;
    timeout(WAIT, async {
        while session.is_cyclic_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cyclic task must finish");
}

#[tokio::test]
async fn test_disconnect_stops_running_cyclic_send() {
    // Arrange
    let (mut session, _rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let _peer = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    wait_for_connections(&session, 1).await;
    assert_ok!(session.send("x", &SendSettings::default().cyclic("20")).await);
    assert!(session.is_cyclic_running());

    // Act
    assert_ok!(timeout(WAIT, session.disconnect()).await.unwrap());

    // Assert
    assert!(!session.is_cyclic_running());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_completes_while_cyclic_send_is_stuck_on_unread_peer() {
    // Arrange: the peer never reads, so the socket buffers fill and the
    // cyclic task ends up parked inside a write.
    let (mut session, mut rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let _peer = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    wait_for_connections(&session, 1).await;
    let payload = "x".repeat(4 * 1024 * 1024);
    let cyclic = SendSettings::default().cyclic("1");
    assert_eq!(
        assert_ok!(session.send(&payload, &cyclic).await),
        SendOutcome::CyclicStarted
    );
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Act
    let result = timeout(WAIT, session.disconnect())
        .await
        .expect("disconnect hung behind a stalled write");

    // Assert
    assert_ok!(result);
    assert!(!session.is_cyclic_running());
    assert!(session.registry().is_empty().await);
    next_matching(&mut rx, |u| matches!(u, UiUpdate::CyclicStopped)).await;
}

#[tokio::test]
async fn test_stop_cyclic_completes_while_send_is_stuck_on_unread_peer() {
    // Arrange
    let (mut session, _rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let _peer = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    wait_for_connections(&session, 1).await;
    let payload = "x".repeat(4 * 1024 * 1024);
    assert_ok!(session.send(&payload, &SendSettings::default().cyclic("1")).await);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Act
    let was_running = timeout(WAIT, session.stop_cyclic())
        .await
        .expect("stop hung behind a stalled write");

    // Assert
    assert!(was_running);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.registry().count().await, 1);
}

#[tokio::test]
async fn test_disconnect_aborts_pending_one_shot_send_to_unread_peer() {
    // Arrange
    let (mut session, _rx) = make_session();
    let port = start_tcp_server(&mut session).await;
    let _peer = TcpStream::connect(format!("127.0.0.1:{port}")).await.unwrap();
    wait_for_connections(&session, 1).await;
    let payload = "x".repeat(64 * 1024 * 1024);
    let prepared = assert_ok!(session.prepare_send(&payload, &SendSettings::default()).await);
    let PreparedSend::Once(pending) = prepared else {
        panic!("a one-shot send must be left to run");
    };
    let sending = tokio::spawn(pending.run());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Act
    assert_ok!(timeout(WAIT, session.disconnect()).await.unwrap());

    // Assert
    let outcome = timeout(WAIT, sending)
        .await
        .expect("pending send must be aborted by disconnect")
        .unwrap();
    assert_eq!(outcome, SendOutcome::Sent(0));
}

#[tokio::test]
async fn test_udp_server_replies_to_configured_target() {
    // Arrange
    let (mut session, mut rx) = make_session();
    let local = assert_ok!(
        session
            .connect(ProtocolKind::UdpServer, "127.0.0.1", "0")
            .await
    );
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    next_matching(&mut rx, |u| *u == UiUpdate::TargetEntry { editable: true }).await;

    // Act
    peer.send_to(b"hello", local).await.unwrap();
    next_matching(&mut rx, |u| matches!(u, UiUpdate::Received(_))).await;
    assert_ok!(
        session
            .set_udp_target("127.0.0.1", &peer_addr.port().to_string())
            .await
    );
    let outcome = assert_ok!(session.send("reply", &SendSettings::default()).await);

    // Assert
    assert_eq!(outcome, SendOutcome::Sent(5));
    let mut buf = [0u8; 64];
    let (n, from) = timeout(WAIT, peer.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], b"reply");
    assert_eq!(from, local);
    let recorded = session.registry().snapshot().await[0].peer_addr();
    assert_eq!(recorded, Some(peer_addr));
}

#[tokio::test]
async fn test_udp_client_hex_display_and_timestamp() {
    // Arrange
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = peer.local_addr().unwrap().port().to_string();
    let (mut session, mut rx) = make_session();
    session.set_receive_settings(ReceiveSettings {
        hex_display: true,
        show_timestamp: true,
        ..ReceiveSettings::default()
    });
    let local = assert_ok!(session.connect(ProtocolKind::UdpClient, "127.0.0.1", &port).await);

    // Act
    peer.send_to(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01], local).await.unwrap();

    // Assert
    let UiUpdate::Received(text) =
        next_matching(&mut rx, |u| matches!(u, UiUpdate::Received(_))).await
    else {
        unreachable!()
    };
    assert!(text.starts_with('['), "missing timestamp: {text:?}");
    assert!(text.ends_with("]:DE AD BE EF 01\n"), "unexpected text: {text:?}");
}

#[tokio::test]
async fn test_paused_display_still_counts() {
    // Arrange
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = peer.local_addr().unwrap().port().to_string();
    let (mut session, mut rx) = make_session();
    session.set_receive_settings(ReceiveSettings {
        pause_display: true,
        ..ReceiveSettings::default()
    });
    let local = assert_ok!(session.connect(ProtocolKind::UdpClient, "127.0.0.1", &port).await);

    // Act
    peer.send_to(b"quiet", local).await.unwrap();

    // Assert
    let counters = next_matching(&mut rx, |u| matches!(u, UiUpdate::Counters { .. })).await;
    assert_eq!(
        counters,
        UiUpdate::Counters {
            received: "Recv count:5".to_string(),
            sent: "Send count:0".to_string(),
        }
    );
    while let Ok(update) = rx.try_recv() {
        assert!(!matches!(update, UiUpdate::Received(_)));
    }
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let (mut session, _rx) = make_session();

    start_tcp_server(&mut session).await;
    assert_ok!(session.disconnect().await);
    let local = assert_ok!(
        session
            .connect(ProtocolKind::UdpServer, "127.0.0.1", "0")
            .await
    );

    assert_ne!(local.port(), 0);
    assert_eq!(session.kind(), Some(ProtocolKind::UdpServer));
    assert_eq!(session.registry().count().await, 1);
}
