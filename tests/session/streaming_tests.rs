//! Reconstruction requests and streaming candidate merging

use std::time::Duration;

use serde_json::json;
use smrp_session::{ReconstructionMode, ReconstructionPayload, ReconstructionSession, Settings};

use crate::common::{candidate_frame, test_config, wait_until, MockServer, ServerConn};

const WAIT: Duration = Duration::from_secs(5);

async fn connected(server: &mut MockServer) -> (ReconstructionSession, ServerConn) {
    let session = ReconstructionSession::start(&test_config(&server.base_url()), Some("s-1")).unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("handshake").await;
    wait_until(WAIT, "connected", || session.is_connected()).await;
    (session, conn)
}

fn payload() -> ReconstructionPayload {
    ReconstructionPayload {
        image_id: Some("folio-12r".to_string()),
        mask_ids: vec!["mask_0".to_string()],
    }
}

#[tokio::test]
async fn test_streaming_partials_merge_into_one_candidate() {
    let mut server = MockServer::start().await;
    let (session, mut conn) = connected(&mut server).await;

    let request_id = session
        .facade()
        .send_reconstruction_request(&payload())
        .expect("request should be sent");
    let request = conn.recv_type("reconstruction_request").await;
    assert_eq!(request["requestId"], request_id.as_str());
    assert_eq!(request["imageId"], "folio-12r");

    conn.send_json(candidate_frame(&request_id, "c1", true, 0.2)).await;
    conn.send_json(candidate_frame(&request_id, "c1", true, 0.4)).await;
    conn.send_json(candidate_frame(&request_id, "c1", false, 0.9)).await;
    conn.send_json(candidate_frame(&request_id, "c2", false, 0.6)).await;
    conn.send_json(json!({
        "type": "reconstruction_progress",
        "requestId": request_id,
        "progress": 100,
        "stage": "Complete"
    }))
    .await;

    wait_until(WAIT, "request finished", || {
        !session.store().read().is_pending(&request_id)
    })
    .await;

    let store = session.store().read();
    assert_eq!(store.candidates().len(), 2);
    assert!(store.streaming().partial(&request_id).is_none());
    assert_eq!(store.selected_id(), Some("c1"));
    let c1 = store.candidates().get("c1").unwrap();
    assert_eq!(c1.combined_score(), Some(0.9));
    assert_eq!(c1.generated_text, "text for c1");
}

#[tokio::test]
async fn test_request_uses_current_settings() {
    let mut server = MockServer::start().await;
    let (session, mut conn) = connected(&mut server).await;

    session
        .update_settings(Settings {
            mode: ReconstructionMode::Adaptive,
            candidate_count: 7,
            temperature: 0.5,
        })
        .unwrap();
    session.facade().send_reconstruction_request(&payload()).unwrap();

    let request = conn.recv_type("reconstruction_request").await;
    assert_eq!(request["mode"], "adaptive");
    assert_eq!(request["nCandidates"], 7);
    assert_eq!(request["temperature"], 0.5);

    session.close().await;
}

#[tokio::test]
async fn test_new_request_drops_late_results_of_old_one() {
    let mut server = MockServer::start().await;
    let (session, mut conn) = connected(&mut server).await;

    let first = session.facade().send_reconstruction_request(&payload()).unwrap();
    conn.send_json(candidate_frame(&first, "old", false, 0.8)).await;
    wait_until(WAIT, "first result", || {
        session.store().read().candidates().contains("old")
    })
    .await;

    let second = session.facade().send_reconstruction_request(&payload()).unwrap();
    assert!(session.store().read().selected_id().is_none());

    conn.send_json(candidate_frame(&first, "late", false, 0.99)).await;
    conn.send_json(candidate_frame(&second, "new", false, 0.3)).await;
    wait_until(WAIT, "second result", || {
        session.store().read().candidates().contains("new")
    })
    .await;

    let store = session.store().read();
    assert_eq!(store.candidates().len(), 1);
    assert!(!store.candidates().contains("late"));
    assert_eq!(store.selected_id(), Some("new"));
}

#[tokio::test]
async fn test_feedback_keeps_candidates_and_is_sent() {
    let mut server = MockServer::start().await;
    let (session, mut conn) = connected(&mut server).await;

    let request_id = session.facade().send_reconstruction_request(&payload()).unwrap();
    conn.send_json(candidate_frame(&request_id, "c1", false, 0.7)).await;
    wait_until(WAIT, "candidate", || !session.store().read().candidates().is_empty()).await;

    let sent = session
        .facade()
        .send_user_feedback(smrp_session::FeedbackRecord::reject("c1"))
        .unwrap();
    assert!(sent);
    let frame = conn.recv_type("user_feedback").await;
    assert_eq!(frame["feedback"]["candidateId"], "c1");

    let store = session.store().read();
    assert!(store.feedback().is_rejected("c1"));
    assert_eq!(store.candidates().len(), 1);
}
