//! Inbound message routing
//!
//! Decodes each raw frame and applies it to the store through exactly one
//! handler. Routing never fails outward: malformed, stale, and unknown frames
//! are logged and dropped, and a handler that errors or panics costs only its
//! own event.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use super::protocol::{decode_frame, InboundEvent};
use crate::error::Result;
use crate::state::{
    LivePreview, MergeOutcome, Notification, ProgressStatus, ServerInfo, Severity, StoreHandle,
};

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler applied the event
    Applied(&'static str),
    /// The event named another session or a superseded request
    Stale,
    /// Unknown tag, ignored
    Ignored { tag: String },
    /// Not valid JSON, no tag, or an invalid payload for a known tag
    Malformed,
    /// Decoded but refused by the store
    Rejected,
}

/// Routes inbound frames into the session store
#[derive(Clone)]
pub struct MessageRouter {
    store: StoreHandle,
}

impl MessageRouter {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub fn dispatch(&self, raw: &str) -> Dispatch {
        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                return Dispatch::Malformed;
            }
        };

        if let Some(session_id) = frame.session_id.as_deref() {
            let ours = self.store.read().session_id() == session_id;
            if !ours {
                debug!("Dropping {} for session {}", frame.event.tag(), session_id);
                return Dispatch::Stale;
            }
        }

        let tag = frame.event.tag().to_string();
        contain(&tag, || self.apply(frame.event))
    }

    fn apply(&self, event: InboundEvent) -> Result<Dispatch> {
        match event {
            InboundEvent::Progress(p) => {
                self.store.write().set_progress(ProgressStatus {
                    request_id: p.request_id,
                    percent: p.progress,
                    stage: p.stage,
                    message: p.message,
                });
                Ok(Dispatch::Applied("progress"))
            }

            InboundEvent::StreamingCandidate(s) if s.partial => {
                let applied = self.store.write().apply_partial(s.request_id, s.candidate)?;
                Ok(if applied {
                    Dispatch::Applied("partial")
                } else {
                    Dispatch::Stale
                })
            }

            InboundEvent::StreamingCandidate(s) => {
                match self.store.write().apply_complete(s.request_id, s.candidate)? {
                    MergeOutcome::Stale => Ok(Dispatch::Stale),
                    MergeOutcome::Inserted | MergeOutcome::Replaced => {
                        Ok(Dispatch::Applied("complete"))
                    }
                }
            }

            InboundEvent::LivePreview(p) => {
                let applied = self.store.write().apply_preview(LivePreview {
                    request_id: p.request_id,
                    text: p.text,
                    confidence: p.confidence,
                })?;
                Ok(if applied {
                    Dispatch::Applied("livePreview")
                } else {
                    Dispatch::Stale
                })
            }

            InboundEvent::ContextUpdate(c) => {
                self.store.write().push_context(c.context);
                Ok(Dispatch::Applied("contextUpdate"))
            }

            InboundEvent::AssistantResponse(a) => {
                self.store.write().push_assistant_response(a.response);
                Ok(Dispatch::Applied("assistantResponse"))
            }

            InboundEvent::Error(e) => {
                warn!("Server error: {}", e.message);
                let mut notification = Notification::new(Severity::Error, e.message);
                notification.code = e.code;

                // The backend reports failures without a request id; those
                // end whichever request is in flight.
                let mut store = self.store.write();
                let request_id = e
                    .request_id
                    .or_else(|| store.active_request().map(str::to_string));
                store.push_notification(notification);
                if let Some(request_id) = request_id.as_deref() {
                    store.finish_request(request_id);
                }
                Ok(Dispatch::Applied("error"))
            }

            InboundEvent::Notification(n) => {
                let mut notification = Notification::new(n.severity, n.message);
                notification.code = n.code;
                self.store.write().push_notification(notification);
                Ok(Dispatch::Applied("notification"))
            }

            InboundEvent::HandshakeAck(ack) => {
                self.store.write().set_server_info(ServerInfo {
                    message: ack.message,
                    features: ack.features,
                });
                Ok(Dispatch::Applied("handshakeAck"))
            }

            InboundEvent::Unknown { tag, .. } => {
                warn!("Ignoring unknown event type '{}'", tag);
                Ok(Dispatch::Ignored { tag })
            }
        }
    }
}

/// Run one handler; an error or a panic rejects only this event
fn contain(tag: &str, handler: impl FnOnce() -> Result<Dispatch>) -> Dispatch {
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(dispatch)) => {
            debug!("Routed {} -> {:?}", tag, dispatch);
            dispatch
        }
        Ok(Err(e)) => {
            warn!("Rejected {} event: {}", tag, e);
            Dispatch::Rejected
        }
        Err(_) => {
            error!("Handler for {} panicked; event dropped", tag);
            Dispatch::Rejected
        }
    }
}
