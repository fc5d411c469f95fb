//! Live reconstruction session
//!
//! `ReconstructionSession` is the owning scope for one session id. Starting it
//! spawns a single driver task that owns the `Supervisor` and `MessageRouter`
//! and handles one input at a time:
//!
//! - transport signals from the current connection
//! - retry timer expiry
//! - control commands (close)
//!
//! Collaborators talk to the session through the `OutboundFacade` and read
//! state through the `StoreHandle`.

pub mod facade;
pub mod protocol;
pub mod router;
pub mod supervisor;
pub mod transport;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use facade::OutboundFacade;
pub use protocol::{
    decode_frame, InboundEvent, InboundFrame, OutboundEnvelope, OutboundMessage,
    ReconstructionPayload, ReconstructionRequest, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
pub use router::{Dispatch, MessageRouter};
pub use supervisor::{
    BackoffStrategy, ConnectionStatus, Dialer, ReconnectPolicy, Supervisor, WebSocketDialer,
};
pub use transport::{
    endpoint_for, Connection, ConnectionId, ConnectionLink, ConnectionPeer, Outgoing, ReadyState,
    SignalSink, TransportSignal,
};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::state::{SessionStore, Settings, StoreEvent, StoreHandle};

enum Control {
    Close { code: u16, reason: String },
}

/// A running session
///
/// Dropping the session closes it best-effort: the driver sees its control
/// channel close and shuts the socket down with a normal closure.
pub struct ReconstructionSession {
    session_id: String,
    store: StoreHandle,
    facade: OutboundFacade,
    status: watch::Receiver<ConnectionStatus>,
    control: mpsc::UnboundedSender<Control>,
    driver: JoinHandle<()>,
}

impl ReconstructionSession {
    /// Start a session against the configured endpoint
    pub fn start(config: &ClientConfig, session_id: Option<&str>) -> Result<Self> {
        Self::start_with_dialer(config, session_id, Arc::new(WebSocketDialer))
    }

    /// Start a session with a custom connection factory
    pub fn start_with_dialer(
        config: &ClientConfig,
        session_id: Option<&str>,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self> {
        config.validate()?;
        let session_id = session_id
            .or(config.connection.session_id.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("default")
            .to_string();
        let endpoint = endpoint_for(&config.connection.base_url, Some(&session_id))?;

        let store = StoreHandle::new(SessionStore::new(
            session_id.clone(),
            config.defaults.clone(),
            config.store.limits(),
        ));
        let link = ConnectionLink::default();
        let facade = OutboundFacade::new(session_id.clone(), link.clone(), store.clone());
        let router = MessageRouter::new(store.clone());

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();

        let mut supervisor = Supervisor::new(
            endpoint.clone(),
            session_id.clone(),
            config.reconnect.clone(),
            dialer,
            link,
            signal_tx,
            retry_tx,
        );
        let status = supervisor.subscribe_status();
        supervisor.open();

        info!("Session {} started against {}", session_id, endpoint);
        let driver = tokio::spawn(drive(supervisor, router, signal_rx, retry_rx, control_rx));

        Ok(Self {
            session_id,
            store,
            facade,
            status,
            control,
            driver,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionStatus::Connected
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Status updates, for waiting on a state change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn facade(&self) -> &OutboundFacade {
        &self.facade
    }

    /// Read-only handle to the session state
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn select_candidate(&self, candidate_id: &str) -> Result<()> {
        self.store.write().select_candidate(candidate_id)
    }

    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        self.store.write().update_settings(settings)
    }

    /// Close with a normal closure and wait for the driver to finish
    pub async fn close(self) {
        self.close_with(NORMAL_CLOSURE, "session closed").await;
    }

    async fn close_with(self, code: u16, reason: &str) {
        let _ = self.control.send(Control::Close {
            code,
            reason: reason.to_string(),
        });
        if let Err(e) = self.driver.await {
            warn!("Session driver ended abnormally: {}", e);
        }
    }

    /// Close this session, then start a new one for `session_id`
    ///
    /// The old socket is closed normally and any pending reconnect is
    /// cancelled before the new endpoint is dialed.
    pub async fn switch_session(self, config: &ClientConfig, session_id: &str) -> Result<Self> {
        info!("Switching session {} -> {}", self.session_id, session_id);
        self.close_with(NORMAL_CLOSURE, "session changed").await;
        Self::start(config, Some(session_id))
    }

    /// Like `switch_session`, with a custom connection factory
    pub async fn switch_session_with_dialer(
        self,
        config: &ClientConfig,
        session_id: &str,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self> {
        self.close_with(NORMAL_CLOSURE, "session changed").await;
        Self::start_with_dialer(config, Some(session_id), dialer)
    }
}

/// Driver loop: one input at a time until closed
async fn drive(
    mut supervisor: Supervisor,
    router: MessageRouter,
    mut signals: mpsc::UnboundedReceiver<(ConnectionId, TransportSignal)>,
    mut retries: mpsc::UnboundedReceiver<u64>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    loop {
        tokio::select! {
            Some((id, signal)) = signals.recv() => {
                if let Some(text) = supervisor.handle_signal(id, signal) {
                    router.dispatch(&text);
                }
            }
            Some(generation) = retries.recv() => supervisor.handle_retry(generation),
            cmd = control.recv() => {
                let (code, reason) = match cmd {
                    Some(Control::Close { code, reason }) => (code, reason),
                    None => (NORMAL_CLOSURE, "session dropped".to_string()),
                };
                supervisor.close(code, &reason);
                break;
            }
        }
    }
    debug!("Session driver stopped");
}
