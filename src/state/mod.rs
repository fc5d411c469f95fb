//! Client-side session state
//!
//! - `candidate` - Candidate values and the per-request `CandidateSet`
//! - `ranking` - Best-candidate policy and presentation sorts
//! - `feedback` - Accept/reject ledger
//! - `settings` - User reconstruction settings
//! - `store` - The `SessionStore` and its shared `StoreHandle`

pub mod candidate;
pub mod feedback;
pub mod ranking;
pub mod settings;
pub mod store;

pub use candidate::{Candidate, CandidateSet, GrammarRule, UncertaintyScores, Upsert};
pub use feedback::{Disposition, FeedbackLedger, FeedbackRecord};
pub use ranking::{best_candidate, sorted_view, SortKey};
pub use settings::{ReconstructionMode, Settings};
pub use store::{
    AssistantRole, AssistantTurn, ContextEntry, LivePreview, MergeOutcome, Notification,
    ProgressStatus, RequestId, ServerInfo, SessionStore, Severity, StoreEvent, StoreHandle,
    StoreLimits, StreamingBuffer,
};
