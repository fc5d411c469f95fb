//! Common test utilities for smrp-session integration tests
//!
//! This module provides:
//! - `MockServer`, a local WebSocket backend that records what clients send
//! - `test_config` for a client pointed at it with a short reconnect delay
//! - Assertions and polling helpers

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod mock_server;

pub use assertions::*;
pub use mock_server::{MockServer, ServerConn};

use std::time::Duration;

use serde_json::{json, Value};
use smrp_session::{ClientConfig, ReconnectPolicy};

/// Reconnect delay used by integration tests
pub const TEST_RECONNECT_DELAY: Duration = Duration::from_millis(50);

pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.connection.base_url = base_url.to_string();
    config.reconnect = ReconnectPolicy::fixed(TEST_RECONNECT_DELAY);
    config
}

/// A `streamingCandidate` frame in the backend's shape
pub fn candidate_frame(request_id: &str, id: &str, partial: bool, combined: f64) -> Value {
    json!({
        "type": "streamingCandidate",
        "requestId": request_id,
        "partial": partial,
        "candidate": {
            "candidate_id": id,
            "sanskrit_text": format!("text for {}", id),
            "iast": format!("iast for {}", id),
            "scores": {"combined": combined, "perplexity": 0.5},
            "generation_strategy": "beam_search",
            "uncertainty_scores": {
                "confidence": combined,
                "epistemic_uncertainty": 0.1,
                "aleatoric_uncertainty": 0.2
            }
        }
    })
}
