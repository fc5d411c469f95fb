//! Session protocol message types
//!
//! Defines the JSON message format exchanged with the reconstruction backend.
//! Inbound tags are matched against a closed set; anything else decodes to
//! `InboundEvent::Unknown` so newer servers do not break older clients.

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::state::{Candidate, FeedbackRecord, ReconstructionMode, Severity};

/// Close code for a normal, intentional shutdown
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the socket drops without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Every inbound tag the router knows, including backend aliases
const KNOWN_TAGS: &[&str] = &[
    "progress",
    "reconstruction_progress",
    "streamingCandidate",
    "streaming_candidate",
    "livePreview",
    "live_preview",
    "contextUpdate",
    "context_update",
    "assistantResponse",
    "assistant_response",
    "error",
    "notification",
    "handshakeAck",
    "handshake_ack",
];

// ============================================================================
// Inbound
// ============================================================================

/// Server-to-client event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "progress", alias = "reconstruction_progress")]
    Progress(ProgressPayload),
    #[serde(rename = "streamingCandidate", alias = "streaming_candidate")]
    StreamingCandidate(StreamingCandidatePayload),
    #[serde(rename = "livePreview", alias = "live_preview")]
    LivePreview(LivePreviewPayload),
    #[serde(rename = "contextUpdate", alias = "context_update")]
    ContextUpdate(ContextUpdatePayload),
    #[serde(rename = "assistantResponse", alias = "assistant_response")]
    AssistantResponse(AssistantResponsePayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
    #[serde(rename = "notification")]
    Notification(NotificationPayload),
    #[serde(rename = "handshakeAck", alias = "handshake_ack")]
    HandshakeAck(HandshakeAckPayload),
    /// Any tag this client does not know
    #[serde(skip_deserializing)]
    Unknown { tag: String, payload: Value },
}

impl InboundEvent {
    /// Canonical tag name, for logging
    pub fn tag(&self) -> &str {
        match self {
            InboundEvent::Progress(_) => "progress",
            InboundEvent::StreamingCandidate(_) => "streamingCandidate",
            InboundEvent::LivePreview(_) => "livePreview",
            InboundEvent::ContextUpdate(_) => "contextUpdate",
            InboundEvent::AssistantResponse(_) => "assistantResponse",
            InboundEvent::Error(_) => "error",
            InboundEvent::Notification(_) => "notification",
            InboundEvent::HandshakeAck(_) => "handshakeAck",
            InboundEvent::Unknown { tag, .. } => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(default, alias = "request_id")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingCandidatePayload {
    #[serde(alias = "request_id")]
    pub request_id: String,
    /// `true` while the candidate is still being generated
    #[serde(default)]
    pub partial: bool,
    pub candidate: Candidate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePreviewPayload {
    #[serde(alias = "request_id")]
    pub request_id: String,
    #[serde(alias = "preview")]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextUpdatePayload {
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantResponsePayload {
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient")]
    pub code: Option<i64>,
    #[serde(default, alias = "request_id")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "level", deserialize_with = "lenient")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "lenient")]
    pub code: Option<i64>,
}

/// Decode an optional field, treating a value of the wrong shape as absent
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandshakeAckPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Session the server addressed, if it said
    pub session_id: Option<String>,
    pub event: InboundEvent,
}

/// Decode a raw text frame
///
/// Unknown tags are not an error; malformed JSON, a missing tag, or a known tag
/// with an invalid payload are.
pub fn decode_frame(raw: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(raw).map_err(|e| SessionError::Decode {
        message: e.to_string(),
    })?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SessionError::MissingTag)?
        .to_string();
    let session_id = value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let event = if KNOWN_TAGS.contains(&tag.as_str()) {
        serde_json::from_value(value).map_err(|e| SessionError::Decode {
            message: format!("invalid '{}' payload: {}", tag, e),
        })?
    } else {
        InboundEvent::Unknown { tag, payload: value }
    };

    Ok(InboundFrame { session_id, event })
}

// ============================================================================
// Outbound
// ============================================================================

/// Regions a collaborator wants reconstructed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconstructionPayload {
    pub image_id: Option<String>,
    pub mask_ids: Vec<String>,
}

/// Full reconstruction request as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructionRequest {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub mask_ids: Vec<String>,
    pub mode: ReconstructionMode,
    pub n_candidates: u32,
    pub temperature: f64,
}

/// Client-to-server message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// First message after the socket opens
    Handshake,
    ReconstructionRequest(ReconstructionRequest),
    MaskSelection {
        #[serde(rename = "maskIds")]
        mask_ids: Vec<String>,
    },
    UserFeedback {
        feedback: FeedbackRecord,
    },
    AssistantQuery {
        query: String,
        context: Value,
    },
}

/// Outbound message stamped with session identity and send time
#[derive(Debug, Serialize)]
pub struct OutboundEnvelope<'a> {
    #[serde(flatten)]
    pub message: &'a OutboundMessage,
    #[serde(rename = "sessionId")]
    pub session_id: &'a str,
    pub timestamp: String,
}

impl<'a> OutboundEnvelope<'a> {
    pub fn stamp(message: &'a OutboundMessage, session_id: &'a str) -> Self {
        Self {
            message,
            session_id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
