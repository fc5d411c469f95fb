//! Outbound request facade
//!
//! The only outbound path. Every message is stamped with the session id and a
//! timestamp and sent through whatever connection is current; each operation
//! returns `true` only if the socket was open.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::{OutboundEnvelope, OutboundMessage, ReconstructionPayload, ReconstructionRequest};
use super::transport::ConnectionLink;
use crate::error::Result;
use crate::state::{FeedbackRecord, StoreHandle};

/// Cloneable sender for one session
#[derive(Clone)]
pub struct OutboundFacade {
    session_id: String,
    link: ConnectionLink,
    store: StoreHandle,
}

impl OutboundFacade {
    pub fn new(session_id: impl Into<String>, link: ConnectionLink, store: StoreHandle) -> Self {
        Self {
            session_id: session_id.into(),
            link,
            store,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    /// Stamp and send any outbound message
    pub fn send(&self, message: &OutboundMessage) -> bool {
        let envelope = OutboundEnvelope::stamp(message, &self.session_id);
        let sent = self.link.send(&envelope);
        if !sent {
            debug!("Not connected; dropped outbound message");
        }
        sent
    }

    /// Request a reconstruction of the given regions
    ///
    /// Mode, candidate count and temperature come from the current settings.
    /// On success the request becomes pending and a fresh candidate set is
    /// started for it; the request id is returned.
    pub fn send_reconstruction_request(&self, payload: &ReconstructionPayload) -> Option<String> {
        // Hold the write lock across the send so no result for the new request
        // can be routed before its candidate set exists.
        let mut store = self.store.write();
        let settings = store.settings().clone();
        let request = ReconstructionRequest {
            request_id: Uuid::new_v4().to_string(),
            image_id: payload.image_id.clone(),
            mask_ids: payload.mask_ids.clone(),
            mode: settings.mode,
            n_candidates: settings.candidate_count,
            temperature: settings.temperature,
        };
        let request_id = request.request_id.clone();

        if !self.send(&OutboundMessage::ReconstructionRequest(request)) {
            return None;
        }
        store.begin_reconstruction(request_id.clone());
        Some(request_id)
    }

    pub fn send_mask_selection(&self, mask_ids: &[String]) -> bool {
        self.send(&OutboundMessage::MaskSelection {
            mask_ids: mask_ids.to_vec(),
        })
    }

    /// Record feedback locally and send it
    ///
    /// The local record is kept even when the socket is down. An invalid
    /// record is neither recorded nor sent.
    pub fn send_user_feedback(&self, record: FeedbackRecord) -> Result<bool> {
        self.store.write().record_feedback(record.clone())?;
        let sent = self.send(&OutboundMessage::UserFeedback { feedback: record });
        if !sent {
            warn!("Feedback recorded locally but not sent");
        }
        Ok(sent)
    }

    /// Ask the assistant; the query is appended to the conversation once sent
    pub fn send_assistant_query(&self, query: &str, context: Value) -> bool {
        let message = OutboundMessage::AssistantQuery {
            query: query.to_string(),
            context,
        };
        if !self.send(&message) {
            return false;
        }
        if let OutboundMessage::AssistantQuery { query, context } = &message {
            self.store.write().push_user_query(query, context);
        }
        true
    }
}
