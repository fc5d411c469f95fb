//! smrp-session: live session client for manuscript reconstruction
//!
//! Keeps a JSON-over-WebSocket session with a reconstruction backend, routes
//! the events it pushes into an in-memory store, merges streaming candidates
//! with final results, and ranks them.
//!
//! # Example
//!
//! ```ignore
//! use smrp_session::{ClientConfig, ReconstructionPayload, ReconstructionSession, SortKey};
//!
//! let config = ClientConfig::load()?;
//! let session = ReconstructionSession::start(&config, Some("s-1"))?;
//!
//! let payload = ReconstructionPayload {
//!     image_id: None,
//!     mask_ids: vec!["mask_0".to_string()],
//! };
//! if let Some(request_id) = session.facade().send_reconstruction_request(&payload) {
//!     println!("requested {}", request_id);
//! }
//!
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     let store = session.store().read();
//!     for candidate in store.sorted(&SortKey::Combined) {
//!         println!("{} {:?}", candidate.generated_text, candidate.combined_score());
//!     }
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod state;

// Re-export commonly used types
pub use config::ClientConfig;
pub use error::{Result, SessionError};
pub use session::{
    ConnectionStatus, Dialer, Dispatch, InboundEvent, MessageRouter, OutboundFacade,
    OutboundMessage, ReconnectPolicy, ReconstructionPayload, ReconstructionSession,
};
pub use state::{
    Candidate, CandidateSet, Disposition, FeedbackRecord, Notification, ReconstructionMode,
    SessionStore, Settings, Severity, SortKey, StoreEvent, StoreHandle,
};
