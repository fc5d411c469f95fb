//! Session state store
//!
//! `SessionStore` owns every piece of client-side session state and exposes a
//! named operation for each allowed mutation. Each operation validates its
//! input before touching any field, so a rejected event leaves the store
//! exactly as it was.
//!
//! # Sharing
//!
//! The store lives behind `StoreHandle` (`Arc<parking_lot::RwLock<_>>`).
//! Collaborators get read access and a `StoreEvent` subscription; write access
//! is crate-private and used only by the router and the outbound facade.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::candidate::{Candidate, CandidateSet, Upsert};
use super::feedback::{FeedbackLedger, FeedbackRecord};
use super::ranking::{self, SortKey};
use super::settings::Settings;
use crate::error::{Result, SessionError};

/// Correlation id for one reconstruction request
pub type RequestId = String;

/// Default cap on the context history
pub const DEFAULT_CONTEXT_HISTORY_LIMIT: usize = 50;

/// Default cap on retained notifications
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 20;

/// Capacity of the store event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// State Types
// ============================================================================

/// Transient progress report for an in-flight request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStatus {
    pub request_id: Option<RequestId>,
    pub percent: f64,
    pub stage: Option<String>,
    pub message: Option<String>,
}

impl ProgressStatus {
    pub fn is_finished(&self) -> bool {
        self.percent >= 100.0
    }
}

/// Notification severity, passed through from the server
///
/// Levels outside the known four are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Other(level) => level,
        }
    }
}

impl From<String> for Severity {
    fn from(level: String) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "info" => Self::Info,
            "success" => Self::Success,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Other(level),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(level) => level,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-visible, non-fatal message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub code: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            code: None,
            timestamp: Utc::now(),
        }
    }
}

/// Lightweight preview text streamed ahead of partial candidates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePreview {
    pub request_id: RequestId,
    pub text: String,
    pub confidence: Option<f64>,
}

/// One context update pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub context: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Who said what in the assistant conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantTurn {
    pub role: AssistantRole,
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Details announced by the server in its handshake acknowledgment
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ServerInfo {
    pub message: Option<String>,
    pub features: Vec<String>,
}

/// In-flight partial output, keyed by request
#[derive(Debug, Clone, Default)]
pub struct StreamingBuffer {
    partials: HashMap<RequestId, Candidate>,
    previews: HashMap<RequestId, LivePreview>,
}

impl StreamingBuffer {
    pub fn partial(&self, request_id: &str) -> Option<&Candidate> {
        self.partials.get(request_id)
    }

    pub fn preview(&self, request_id: &str) -> Option<&LivePreview> {
        self.previews.get(request_id)
    }

    pub fn partials(&self) -> impl Iterator<Item = (&str, &Candidate)> {
        self.partials.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty() && self.previews.is_empty()
    }

    fn clear_request(&mut self, request_id: &str) -> bool {
        let had_partial = self.partials.remove(request_id).is_some();
        let had_preview = self.previews.remove(request_id).is_some();
        had_partial || had_preview
    }

    fn retain_request(&mut self, request_id: &str) {
        self.partials.retain(|k, _| k == request_id);
        self.previews.retain(|k, _| k == request_id);
    }
}

/// Change notifications published to subscribers after each mutation
#[derive(Debug, Clone)]
pub enum StoreEvent {
    RequestStarted { request_id: RequestId },
    RequestFinished { request_id: RequestId },
    CandidatesChanged { request_id: Option<RequestId> },
    SelectionChanged { candidate_id: Option<String> },
    StreamingUpdated { request_id: RequestId },
    Progress(ProgressStatus),
    Notification(Notification),
    ContextUpdated,
    AssistantResponse(AssistantTurn),
    FeedbackRecorded(FeedbackRecord),
    SettingsChanged(Settings),
    ServerInfo(ServerInfo),
}

/// Outcome of merging a final candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    /// The candidate belongs to a superseded request and was dropped
    Stale,
}

/// Bounds on the store's rolling collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub context_history: usize,
    pub notifications: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            context_history: DEFAULT_CONTEXT_HISTORY_LIMIT,
            notifications: DEFAULT_NOTIFICATION_LIMIT,
        }
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// All client-side state for one session
pub struct SessionStore {
    session_id: String,
    candidates: CandidateSet,
    selected: Option<String>,
    streaming: StreamingBuffer,
    progress: Option<ProgressStatus>,
    context_history: VecDeque<ContextEntry>,
    feedback: FeedbackLedger,
    settings: Settings,
    notifications: VecDeque<Notification>,
    assistant: Vec<AssistantTurn>,
    pending: HashSet<RequestId>,
    server_info: Option<ServerInfo>,
    limits: StoreLimits,
    events: broadcast::Sender<StoreEvent>,
}

impl SessionStore {
    pub fn new(session_id: impl Into<String>, settings: Settings, limits: StoreLimits) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_id: session_id.into(),
            candidates: CandidateSet::default(),
            selected: None,
            streaming: StreamingBuffer::default(),
            progress: None,
            context_history: VecDeque::new(),
            feedback: FeedbackLedger::default(),
            settings,
            notifications: VecDeque::new(),
            assistant: Vec::new(),
            pending: HashSet::new(),
            server_info: None,
            limits,
            events,
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&Candidate> {
        self.selected.as_deref().and_then(|id| self.candidates.get(id))
    }

    /// Current best candidate by the ranking policy
    pub fn best(&self) -> Option<&Candidate> {
        ranking::best_candidate(self.candidates.as_slice())
    }

    /// Presentation-only sorted view
    pub fn sorted(&self, key: &SortKey) -> Vec<&Candidate> {
        ranking::sorted_view(self.candidates.as_slice(), key)
    }

    pub fn streaming(&self) -> &StreamingBuffer {
        &self.streaming
    }

    pub fn progress(&self) -> Option<&ProgressStatus> {
        self.progress.as_ref()
    }

    pub fn context_history(&self) -> impl Iterator<Item = &ContextEntry> {
        self.context_history.iter()
    }

    pub fn context_len(&self) -> usize {
        self.context_history.len()
    }

    pub fn feedback(&self) -> &FeedbackLedger {
        &self.feedback
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn assistant_conversation(&self) -> &[AssistantTurn] {
        &self.assistant
    }

    pub fn pending_requests(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.pending.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.contains(request_id)
    }

    /// Request the current candidate set belongs to
    pub fn active_request(&self) -> Option<&str> {
        self.candidates.request_id()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Start a new reconstruction: the candidate set is replaced and selection cleared
    pub(crate) fn begin_reconstruction(&mut self, request_id: RequestId) {
        debug!("Starting candidate set for request {}", request_id);
        self.candidates = CandidateSet::new(Some(request_id.clone()));
        self.streaming.retain_request(&request_id);
        self.pending.clear();
        self.pending.insert(request_id.clone());
        self.progress = None;

        let had_selection = self.selected.take().is_some();

        self.emit(StoreEvent::RequestStarted {
            request_id: request_id.clone(),
        });
        self.emit(StoreEvent::CandidatesChanged {
            request_id: Some(request_id),
        });
        if had_selection {
            self.emit(StoreEvent::SelectionChanged { candidate_id: None });
        }
    }

    /// Whether events for this request belong to the current set
    fn accepts_request(&self, request_id: &str) -> bool {
        match self.candidates.request_id() {
            Some(active) => active == request_id,
            None => true,
        }
    }

    /// Replace the in-flight partial candidate for a request
    pub(crate) fn apply_partial(&mut self, request_id: RequestId, candidate: Candidate) -> Result<bool> {
        validate_ids(&request_id, &candidate)?;
        if !self.accepts_request(&request_id) {
            debug!("Dropping partial for superseded request {}", request_id);
            return Ok(false);
        }

        self.streaming.partials.insert(request_id.clone(), candidate);
        self.emit(StoreEvent::StreamingUpdated { request_id });
        Ok(true)
    }

    /// Merge a final candidate, clear the request's streaming state and re-rank
    pub(crate) fn apply_complete(
        &mut self,
        request_id: RequestId,
        candidate: Candidate,
    ) -> Result<MergeOutcome> {
        validate_ids(&request_id, &candidate)?;
        if !self.candidates.bind(&request_id) {
            debug!(
                "Dropping final candidate {} for superseded request {}",
                candidate.id, request_id
            );
            return Ok(MergeOutcome::Stale);
        }

        let outcome = match self.candidates.upsert(candidate) {
            Upsert::Inserted => MergeOutcome::Inserted,
            Upsert::Replaced => MergeOutcome::Replaced,
        };

        if self.streaming.clear_request(&request_id) {
            self.emit(StoreEvent::StreamingUpdated {
                request_id: request_id.clone(),
            });
        }
        self.emit(StoreEvent::CandidatesChanged {
            request_id: Some(request_id),
        });
        self.rerank();

        Ok(outcome)
    }

    /// Replace the preview slot for a request
    pub(crate) fn apply_preview(&mut self, preview: LivePreview) -> Result<bool> {
        if preview.request_id.is_empty() {
            return Err(SessionError::InvalidEvent {
                message: "live preview without requestId".to_string(),
            });
        }
        if !self.accepts_request(&preview.request_id) {
            debug!("Dropping preview for superseded request {}", preview.request_id);
            return Ok(false);
        }

        let request_id = preview.request_id.clone();
        self.streaming.previews.insert(request_id.clone(), preview);
        self.emit(StoreEvent::StreamingUpdated { request_id });
        Ok(true)
    }

    /// Record transient progress; a finished report resolves its request
    pub(crate) fn set_progress(&mut self, progress: ProgressStatus) {
        if progress.is_finished() {
            // Untagged progress refers to the active request
            let request_id = progress
                .request_id
                .clone()
                .or_else(|| self.active_request().map(str::to_string));
            if let Some(request_id) = request_id {
                self.finish_request(&request_id);
            }
        }
        self.progress = Some(progress.clone());
        self.emit(StoreEvent::Progress(progress));
    }

    /// Mark a request as no longer pending
    pub(crate) fn finish_request(&mut self, request_id: &str) {
        if self.pending.remove(request_id) {
            self.emit(StoreEvent::RequestFinished {
                request_id: request_id.to_string(),
            });
        }
    }

    /// Append to the context history, evicting the oldest entries past the cap
    pub(crate) fn push_context(&mut self, context: serde_json::Value) {
        self.context_history.push_back(ContextEntry {
            context,
            received_at: Utc::now(),
        });
        while self.context_history.len() > self.limits.context_history {
            self.context_history.pop_front();
        }
        self.emit(StoreEvent::ContextUpdated);
    }

    pub(crate) fn push_notification(&mut self, notification: Notification) {
        self.notifications.push_back(notification.clone());
        while self.notifications.len() > self.limits.notifications {
            self.notifications.pop_front();
        }
        self.emit(StoreEvent::Notification(notification));
    }

    pub(crate) fn push_user_query(&mut self, query: &str, context: &serde_json::Value) {
        self.assistant.push(AssistantTurn {
            role: AssistantRole::User,
            content: serde_json::json!({ "query": query, "context": context }),
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn push_assistant_response(&mut self, response: serde_json::Value) {
        let turn = AssistantTurn {
            role: AssistantRole::Assistant,
            content: response,
            timestamp: Utc::now(),
        };
        self.assistant.push(turn.clone());
        self.emit(StoreEvent::AssistantResponse(turn));
    }

    /// Record accept/reject feedback; candidates are never removed
    pub(crate) fn record_feedback(&mut self, record: FeedbackRecord) -> Result<()> {
        if record.candidate_id.is_empty() {
            return Err(SessionError::InvalidEvent {
                message: "feedback without candidateId".to_string(),
            });
        }
        if let Some(rating) = record.rating {
            if !rating.is_finite() {
                return Err(SessionError::InvalidEvent {
                    message: format!("rating must be finite, got {}", rating),
                });
            }
        }
        if !self.candidates.contains(&record.candidate_id) {
            warn!(
                "Feedback for candidate {} not in the current set",
                record.candidate_id
            );
        }

        self.feedback.record(record.clone());
        self.emit(StoreEvent::FeedbackRecorded(record));
        Ok(())
    }

    /// Explicit user selection; the candidate must be in the current set
    pub(crate) fn select_candidate(&mut self, candidate_id: &str) -> Result<()> {
        if !self.candidates.contains(candidate_id) {
            return Err(SessionError::UnknownCandidate {
                id: candidate_id.to_string(),
            });
        }
        if self.selected.as_deref() != Some(candidate_id) {
            self.selected = Some(candidate_id.to_string());
            self.emit(StoreEvent::SelectionChanged {
                candidate_id: self.selected.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn update_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.settings = settings.clone();
        self.emit(StoreEvent::SettingsChanged(settings));
        Ok(())
    }

    pub(crate) fn set_server_info(&mut self, info: ServerInfo) {
        self.server_info = Some(info.clone());
        self.emit(StoreEvent::ServerInfo(info));
    }

    /// Auto-select the best candidate when nothing valid is selected
    fn rerank(&mut self) {
        if let Some(id) = &self.selected {
            if !self.candidates.contains(id) {
                self.selected = None;
            }
        }
        if self.selected.is_some() {
            return;
        }

        if let Some(best) = ranking::best_candidate(self.candidates.as_slice()) {
            self.selected = Some(best.id.clone());
            self.emit(StoreEvent::SelectionChanged {
                candidate_id: self.selected.clone(),
            });
        }
    }
}

fn validate_ids(request_id: &str, candidate: &Candidate) -> Result<()> {
    if request_id.is_empty() {
        return Err(SessionError::InvalidEvent {
            message: "streaming candidate without requestId".to_string(),
        });
    }
    if candidate.id.is_empty() {
        return Err(SessionError::InvalidEvent {
            message: "candidate without id".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// StoreHandle
// ============================================================================

/// Shared handle to a `SessionStore`
///
/// Cloning is cheap. Only crate code can take the write lock.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<SessionStore>>,
}

impl StoreHandle {
    pub fn new(store: SessionStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Read access for rendering
    pub fn read(&self) -> RwLockReadGuard<'_, SessionStore> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SessionStore> {
        self.inner.write()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.read().subscribe()
    }
}
