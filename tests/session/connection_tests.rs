//! Connection setup, outbound frames and inbound routing

use std::time::Duration;

use serde_json::json;
use smrp_session::{ConnectionStatus, ReconstructionSession, Severity};

use crate::common::{test_config, wait_until, MockServer};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_handshake_is_first_frame() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();

    let mut conn = server.accept().await;
    assert_eq!(conn.path, "/ws/s-1");

    let first = conn.recv_json().await;
    assert_eq!(first["type"], "handshake");
    assert_eq!(first["sessionId"], "s-1");
    assert!(first["timestamp"].is_string());

    wait_until(WAIT, "connected", || session.is_connected()).await;
    session.close().await;
}

#[tokio::test]
async fn test_default_session_path() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), None).unwrap();

    let conn = server.accept().await;
    assert_eq!(conn.path, "/ws/default");
    session.close().await;
}

#[tokio::test]
async fn test_mask_selection_frame() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    let masks = vec!["mask_0".to_string(), "mask_3".to_string()];
    assert!(session.facade().send_mask_selection(&masks));

    let frame = conn.recv_type("mask_selection").await;
    assert_eq!(frame["maskIds"], json!(["mask_0", "mask_3"]));
    assert_eq!(frame["sessionId"], "s-1");

    session.close().await;
}

#[tokio::test]
async fn test_send_without_server_returns_false() {
    // Bind then drop a listener so the port is very likely closed
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = test_config(&format!("ws://{}/ws", addr));
    let session = ReconstructionSession::start(&config, Some("s-1")).unwrap();

    assert!(!session.facade().send_mask_selection(&["mask_0".to_string()]));
    assert!(!session.facade().send_assistant_query("hello?", json!({})));
    assert!(session.store().read().assistant_conversation().is_empty());
    assert_ne!(session.connection_status(), ConnectionStatus::Connected);

    session.close().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_break_the_session() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("handshake").await;

    conn.send_text("this is not json".to_string()).await;
    conn.send_json(json!({"message": "no type"})).await;
    conn.send_json(json!({"type": "echo", "data": "ignored"})).await;
    conn.send_json(json!({"type": "notification", "message": "still here", "severity": "info"}))
        .await;

    wait_until(WAIT, "notification", || {
        session.store().read().notifications().count() == 1
    })
    .await;
    assert!(session.is_connected());
    session.close().await;
}

#[tokio::test]
async fn test_events_for_other_sessions_are_dropped() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("handshake").await;

    conn.send_json(json!({"type": "error", "message": "not yours", "sessionId": "s-2"}))
        .await;
    conn.send_json(json!({"type": "error", "message": "yours", "sessionId": "s-1"}))
        .await;

    wait_until(WAIT, "error notification", || {
        session.store().read().notifications().count() > 0
    })
    .await;
    let store = session.store().read();
    let messages: Vec<_> = store.notifications().map(|n| n.message.clone()).collect();
    assert_eq!(messages, vec!["yours".to_string()]);
    assert_eq!(
        store.notifications().next().unwrap().severity,
        Severity::Error
    );
    drop(store);

    session.close().await;
}

#[tokio::test]
async fn test_handshake_ack_and_assistant_round_trip() {
    let mut server = MockServer::start().await;
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("handshake").await;
    conn.send_json(json!({
        "type": "handshake_ack",
        "message": "Connected to Sanskrit Reconstruction Portal",
        "features": ["Real-time reconstruction", "AI assistant chat"]
    }))
    .await;

    wait_until(WAIT, "server info", || session.store().read().server_info().is_some()).await;
    wait_until(WAIT, "connected", || session.is_connected()).await;

    assert!(session
        .facade()
        .send_assistant_query("What is the meaning?", json!({"selected_masks": ["mask_0"]})));
    let query = conn.recv_type("assistant_query").await;
    assert_eq!(query["query"], "What is the meaning?");

    conn.send_json(json!({"type": "assistant_response", "response": {"text": "It praises dharma."}}))
        .await;
    wait_until(WAIT, "assistant response", || {
        session.store().read().assistant_conversation().len() == 2
    })
    .await;

    session.close().await;
}
