//! Reconnect behavior against a real socket

use std::time::Duration;

use smrp_session::{ConnectionStatus, ReconnectPolicy, ReconstructionSession};

use crate::common::{test_config, wait_until, MockServer};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_reconnects_after_abnormal_close() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();

    let mut first = server.accept().await;
    first.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    first.close(1011).await;

    let mut second = server.accept().await;
    assert_eq!(second.path, "/ws/s-1");
    let handshake = second.recv_type("handshake").await;
    assert_eq!(handshake["sessionId"], "s-1");
    wait_until(WAIT, "reconnected", || session.is_connected()).await;

    session.close().await;
}

#[tokio::test]
async fn test_reconnects_after_dropped_socket() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();

    let mut first = server.accept().await;
    first.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    // No close frame at all
    drop(first);

    let mut second = server.accept().await;
    second.recv_type("handshake").await;
    wait_until(WAIT, "reconnected", || session.is_connected()).await;

    session.close().await;
}

#[tokio::test]
async fn test_no_reconnect_after_normal_close() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();

    let mut first = server.accept().await;
    first.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    first.close(1000).await;
    wait_until(WAIT, "disconnected", || {
        session.connection_status() == ConnectionStatus::Disconnected
    })
    .await;

    assert!(server.accept_within(Duration::from_millis(500)).await.is_none());
    assert!(!session.facade().send_mask_selection(&["mask_0".to_string()]));

    session.close().await;
}

#[tokio::test]
async fn test_close_stops_reconnecting() {
    let mut server = MockServer::start().await;
    let mut config = test_config(&server.base_url());
    config.reconnect = ReconnectPolicy::fixed(Duration::from_millis(400));
    let session = ReconstructionSession::start(&config, Some("s-1")).unwrap();

    let mut first = server.accept().await;
    first.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    let mut status = session.watch_status();
    first.close(1011).await;
    tokio::time::timeout(
        WAIT,
        status.wait_for(|s| *s == ConnectionStatus::Reconnecting),
    )
    .await
    .expect("never started reconnecting")
    .expect("status channel closed");

    session.close().await;
    assert!(server.accept_within(Duration::from_millis(800)).await.is_none());
}

#[tokio::test]
async fn test_switch_session_redials_new_path() {
    let mut server = MockServer::start().await;
    let config = test_config(&server.base_url());
    let session = ReconstructionSession::start(&config, Some("a")).unwrap();

    let mut first = server.accept().await;
    first.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    let session = session.switch_session(&config, "b").await.unwrap();
    let mut second = server.accept().await;
    assert_eq!(second.path, "/ws/b");
    let handshake = second.recv_type("handshake").await;
    assert_eq!(handshake["sessionId"], "b");

    session.close().await;
}
