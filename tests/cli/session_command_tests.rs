//! Tests for the `reconstruct` and `ask` CLI commands against the mock backend

use serde_json::json;

use super::CliEnv;
use crate::common::{assert_contains, assert_valid_json, candidate_frame, MockServer};

#[tokio::test]
async fn test_reconstruct_prints_ranked_candidates() {
    let mut server = MockServer::start().await;
    let url = server.base_url();

    let backend = tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.recv_type("handshake").await;
        let request = conn.recv_type("reconstruction_request").await;
        let request_id = request["requestId"].as_str().unwrap().to_string();
        assert_eq!(request["maskIds"], json!(["mask_0", "mask_1"]));
        assert_eq!(request["mode"], "soft");
        assert_eq!(request["nCandidates"], 2);

        conn.send_json(candidate_frame(&request_id, "low", false, 0.4)).await;
        conn.send_json(candidate_frame(&request_id, "high", false, 0.8)).await;
        conn.send_json(json!({
            "type": "reconstruction_progress",
            "progress": 100,
            "stage": "Complete",
            "message": "Generated 2 candidates"
        }))
        .await;
        // Keep the socket up until the client hangs up
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), conn.recv_json()).await;
    });

    let env = CliEnv::new();
    let output = env
        .run_success(&[
            "--url",
            &url,
            "--session",
            "cli-1",
            "reconstruct",
            "--mask",
            "mask_0",
            "--mask",
            "mask_1",
            "--mode",
            "soft",
            "--candidates",
            "2",
            "--timeout-secs",
            "10",
        ])
        .await;

    let report = assert_valid_json(&output, "reconstruct output");
    assert_eq!(report["selected"], "high");
    assert_eq!(report["candidates"][0]["id"], "high");
    assert_eq!(report["candidates"][1]["id"], "low");

    backend.abort();
}

#[tokio::test]
async fn test_ask_prints_response_text() {
    let mut server = MockServer::start().await;
    let url = server.base_url();

    let backend = tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.recv_type("handshake").await;
        let query = conn.recv_type("assistant_query").await;
        assert_eq!(query["query"], "What does it say?");
        assert_eq!(query["context"]["line"], 2);
        conn.send_json(json!({
            "type": "assistant_response",
            "response": {"text": "It praises dharma."}
        }))
        .await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), conn.recv_json()).await;
    });

    let env = CliEnv::new();
    let output = env
        .run_success(&[
            "--url",
            &url,
            "ask",
            "What does it say?",
            "--context",
            r#"{"line": 2}"#,
        ])
        .await;
    assert_eq!(output.trim(), "It praises dharma.");

    backend.abort();
}

#[tokio::test]
async fn test_reconstruct_without_backend_fails() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let env = CliEnv::new();
    std::fs::write(
        env.config_path(),
        "[reconnect]\ndelay_ms = 20\nmax_attempts = 2\n",
    )
    .unwrap();

    let (code, _) = env
        .run_failure(&[
            "--url",
            &format!("ws://{}/ws", addr),
            "reconstruct",
            "--mask",
            "mask_0",
        ])
        .await;
    assert_eq!(code, Some(5));
}

#[tokio::test]
async fn test_reconstruct_server_error_exit_code() {
    let mut server = MockServer::start().await;
    let url = server.base_url();

    let backend = tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.recv_type("handshake").await;
        conn.recv_type("reconstruction_request").await;
        conn.send_json(json!({
            "type": "error",
            "message": "Model service failed",
            "code": 500
        }))
        .await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), conn.recv_json()).await;
    });

    let env = CliEnv::new();
    let started = std::time::Instant::now();
    let (code, stderr) = env
        .run_failure(&[
            "--url",
            &url,
            "reconstruct",
            "--mask",
            "mask_0",
            "--timeout-secs",
            "30",
        ])
        .await;
    assert_eq!(code, Some(6));
    assert_contains(&stderr, "Model service failed", "reconstruct failure");
    assert!(started.elapsed() < std::time::Duration::from_secs(20));

    backend.abort();
}
