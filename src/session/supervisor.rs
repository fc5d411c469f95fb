//! Reconnection supervisor
//!
//! Wraps successive `Connection`s for one session. An abnormal closure (any
//! close code other than 1000) schedules a reconnect through a single-slot
//! `RetryTimer`; a normal closure or an explicit `close()` is terminal.
//!
//! ```text
//! disconnected --open()--> connecting --Open--> connected
//! connected --Close(!=1000)--> reconnecting --delay--> connecting
//! connected --Close(1000)--> disconnected
//! any --close()--> disconnected
//! reconnecting --attempts exhausted--> failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::NORMAL_CLOSURE;
use super::transport::{Connection, ConnectionId, ConnectionLink, SignalSink, TransportSignal};
use crate::error::{Result, SessionError};

/// Connection lifecycle as seen by collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ConnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Dialing
// ============================================================================

/// Creates connections for the supervisor
pub trait Dialer: Send + Sync {
    fn dial(&self, endpoint: &str, session_id: &str, sink: SignalSink) -> Connection;
}

/// Dials real WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
    fn dial(&self, endpoint: &str, session_id: &str, sink: SignalSink) -> Connection {
        Connection::open(endpoint.to_string(), session_id.to_string(), sink)
    }
}

// ============================================================================
// Reconnect Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every attempt
    #[default]
    Fixed,
    /// Delay doubles per attempt up to `max_delay_ms`
    Exponential,
}

/// When and how often to reconnect after an abnormal closure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default)]
    pub strategy: BackoffStrategy,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize each delay uniformly in `0..=delay`
    #[serde(default)]
    pub jitter: bool,
    /// Maximum consecutive attempts (0 = unlimited)
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            delay_ms: default_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay, unlimited attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Delay before the given attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Fixed => self.delay_ms,
            BackoffStrategy::Exponential => {
                let shift = attempt.saturating_sub(1).min(32);
                self.delay_ms
                    .saturating_mul(1u64 << shift)
                    .min(self.max_delay_ms.max(self.delay_ms))
            }
        };

        let millis = if self.jitter && base > 0 {
            rand::thread_rng().gen_range(0..=base)
        } else {
            base
        };
        Duration::from_millis(millis)
    }

    /// Whether the given attempt (1-based) may run
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategy == BackoffStrategy::Exponential && self.max_delay_ms < self.delay_ms {
            return Err(SessionError::ConfigError {
                message: format!(
                    "reconnect.max_delay_ms ({}) is below reconnect.delay_ms ({})",
                    self.max_delay_ms, self.delay_ms
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Retry Timer
// ============================================================================

/// At most one pending reconnect timer
///
/// Each arm gets a fresh generation number; expiry is reported by sending that
/// generation, and only the generation currently armed may fire.
struct RetryTimer {
    slot: Option<(u64, JoinHandle<()>)>,
    generation: u64,
    tx: mpsc::UnboundedSender<u64>,
}

impl RetryTimer {
    fn new(tx: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            slot: None,
            generation: 0,
            tx,
        }
    }

    fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(generation);
        });
        self.slot = Some((generation, handle));
        generation
    }

    fn cancel(&mut self) -> bool {
        match self.slot.take() {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Consume an expiry; `false` if it belongs to a cancelled arm
    fn fire(&mut self, generation: u64) -> bool {
        match &self.slot {
            Some((armed, _)) if *armed == generation => {
                self.slot = None;
                true
            }
            _ => false,
        }
    }

    fn is_armed(&self) -> bool {
        self.slot.is_some()
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owns the connection lifecycle for one session
pub struct Supervisor {
    endpoint: String,
    session_id: String,
    policy: ReconnectPolicy,
    dialer: Arc<dyn Dialer>,
    link: ConnectionLink,
    signal_tx: mpsc::UnboundedSender<(ConnectionId, TransportSignal)>,
    current: Option<ConnectionId>,
    next_id: ConnectionId,
    timer: RetryTimer,
    attempts: u32,
    closed: bool,
    status: watch::Sender<ConnectionStatus>,
}

impl Supervisor {
    pub fn new(
        endpoint: String,
        session_id: String,
        policy: ReconnectPolicy,
        dialer: Arc<dyn Dialer>,
        link: ConnectionLink,
        signal_tx: mpsc::UnboundedSender<(ConnectionId, TransportSignal)>,
        retry_tx: mpsc::UnboundedSender<u64>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            endpoint,
            session_id,
            policy,
            dialer,
            link,
            signal_tx,
            current: None,
            next_id: 0,
            timer: RetryTimer::new(retry_tx),
            attempts: 0,
            closed: false,
            status,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Consecutive reconnect attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retry_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn open(&mut self) {
        if self.closed {
            warn!("Session {} is closed; not opening", self.session_id);
            return;
        }
        self.dial();
    }

    fn dial(&mut self) {
        self.next_id += 1;
        let id = self.next_id;
        debug!("Dialing {} as connection {}", self.endpoint, id);

        let sink = SignalSink::new(id, self.signal_tx.clone());
        let conn = self.dialer.dial(&self.endpoint, &self.session_id, sink);
        self.current = Some(id);
        if let Some(previous) = self.link.replace(conn) {
            previous.close(NORMAL_CLOSURE, "superseded");
        }
        self.set_status(ConnectionStatus::Connecting);
    }

    /// Apply a transport signal; returns the frame text for `Message` signals
    ///
    /// Signals from superseded connections are ignored.
    pub fn handle_signal(&mut self, id: ConnectionId, signal: TransportSignal) -> Option<String> {
        if self.current != Some(id) {
            debug!("Ignoring {:?} from stale connection {}", signal, id);
            return None;
        }

        match signal {
            TransportSignal::Open => {
                self.timer.cancel();
                self.attempts = 0;
                self.set_status(ConnectionStatus::Connected);
                None
            }
            TransportSignal::Message(text) => Some(text),
            TransportSignal::Error(message) => {
                warn!("Connection {} error: {}", id, message);
                None
            }
            TransportSignal::Close { code, reason } => {
                self.current = None;
                self.link.take();
                if self.closed {
                    self.set_status(ConnectionStatus::Disconnected);
                } else if code == NORMAL_CLOSURE {
                    info!("Connection {} closed normally", id);
                    self.set_status(ConnectionStatus::Disconnected);
                } else {
                    warn!("Connection {} closed abnormally ({}) {}", id, code, reason);
                    self.schedule_retry();
                }
                None
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.attempts += 1;
        if !self.policy.allows(self.attempts) {
            warn!(
                "Max reconnection attempts ({}) reached for session {}",
                self.policy.max_attempts, self.session_id
            );
            self.timer.cancel();
            self.set_status(ConnectionStatus::Failed);
            return;
        }

        let delay = self.policy.delay_for(self.attempts);
        info!(
            "Reconnecting session {} in {:?} (attempt {})",
            self.session_id, delay, self.attempts
        );
        self.timer.arm(delay);
        self.set_status(ConnectionStatus::Reconnecting);
    }

    /// A retry timer expired
    pub fn handle_retry(&mut self, generation: u64) {
        if !self.timer.fire(generation) {
            debug!("Ignoring cancelled retry timer {}", generation);
            return;
        }
        if self.closed {
            return;
        }
        self.dial();
    }

    /// Terminal close: cancel any pending retry and close the socket
    pub fn close(&mut self, code: u16, reason: &str) {
        self.closed = true;
        if self.timer.cancel() {
            debug!("Cancelled pending reconnect for session {}", self.session_id);
        }
        self.current = None;
        if let Some(conn) = self.link.take() {
            conn.close(code, reason);
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!("Session {} {} -> {}", self.session_id, previous, status);
        }
    }
}
