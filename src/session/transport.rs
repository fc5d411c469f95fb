//! WebSocket transport
//!
//! A `Connection` is one physical socket to one endpoint. The socket runs in
//! its own task and only exchanges strings with the rest of the session: frames
//! to send arrive over an unbounded channel, and everything the socket observes
//! is reported back as a `TransportSignal` tagged with the connection id.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::protocol::{OutboundEnvelope, OutboundMessage, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::error::{Result, SessionError};

/// Close code used when the peer closed without giving one
const NO_STATUS_RECEIVED: u16 = 1005;

/// Identifies one physical connection for the lifetime of a session
pub type ConnectionId = u64;

/// What a connection observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Open,
    Message(String),
    Close { code: u16, reason: String },
    Error(String),
}

/// Where a connection reports its signals
#[derive(Debug, Clone)]
pub struct SignalSink {
    connection_id: ConnectionId,
    tx: mpsc::UnboundedSender<(ConnectionId, TransportSignal)>,
}

impl SignalSink {
    pub fn new(
        connection_id: ConnectionId,
        tx: mpsc::UnboundedSender<(ConnectionId, TransportSignal)>,
    ) -> Self {
        Self { connection_id, tx }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Report a signal; a closed receiver means the session is gone
    pub fn emit(&self, signal: TransportSignal) {
        let _ = self.tx.send((self.connection_id, signal));
    }
}

/// Socket ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Command queued for the socket task
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Frame(String),
    Close { code: u16, reason: String },
}

/// Handle to one physical connection
///
/// Clones share the same socket. When the last clone is dropped the socket
/// task closes with a normal closure.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outgoing>,
}

impl Connection {
    /// Start connecting to `endpoint`
    ///
    /// Returns immediately in `Connecting`. Once the WebSocket handshake
    /// succeeds the handshake message is written as the first frame and
    /// `TransportSignal::Open` is emitted.
    pub fn open(endpoint: String, session_id: String, sink: SignalSink) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let conn = Self {
            id: sink.connection_id(),
            state: state.clone(),
            outbound,
        };

        tokio::spawn(run_socket(endpoint, session_id, state, sink, outbound_rx));
        conn
    }

    /// A connection backed by an in-process peer instead of a socket
    ///
    /// Custom `Dialer`s build on this; the peer decides when the connection
    /// counts as open and receives every queued frame.
    pub fn detached(id: ConnectionId) -> (Self, ConnectionPeer) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let conn = Self {
            id,
            state: state.clone(),
            outbound,
        };
        (
            conn,
            ConnectionPeer {
                state,
                outbound: outbound_rx,
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Serialize and queue a message; `false` unless the socket is open
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        if !self.is_open() {
            return false;
        }
        match serde_json::to_string(message) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                false
            }
        }
    }

    /// Queue a raw text frame; `false` unless the socket is open
    pub fn send_text(&self, text: String) -> bool {
        self.is_open() && self.outbound.send(Outgoing::Frame(text)).is_ok()
    }

    /// Orderly shutdown with the given close code
    pub fn close(&self, code: u16, reason: &str) {
        let current = self.ready_state();
        if current == ReadyState::Closed || current == ReadyState::Closing {
            return;
        }
        self.state
            .store(ReadyState::Closing as u8, Ordering::Release);
        let _ = self.outbound.send(Outgoing::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Far end of a detached connection
#[derive(Debug)]
pub struct ConnectionPeer {
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedReceiver<Outgoing>,
}

impl ConnectionPeer {
    pub fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Next queued command, if one is waiting
    pub fn try_next(&mut self) -> Option<Outgoing> {
        self.outbound.try_recv().ok()
    }

    /// Wait for the next queued command; `None` once every handle is dropped
    pub async fn next(&mut self) -> Option<Outgoing> {
        self.outbound.recv().await
    }
}

/// Socket task: dial, write the handshake, then pump frames both ways
async fn run_socket(
    endpoint: String,
    session_id: String,
    state: Arc<AtomicU8>,
    sink: SignalSink,
    mut outbound_rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    let conn_id = sink.connection_id();
    let fail = |message: String| {
        state.store(ReadyState::Closed as u8, Ordering::Release);
        sink.emit(TransportSignal::Error(message.clone()));
        sink.emit(TransportSignal::Close {
            code: ABNORMAL_CLOSURE,
            reason: message,
        });
    };

    debug!("Connection {} dialing {}", conn_id, endpoint);
    let ws = match connect_async(endpoint.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!("Connection {} failed to connect to {}: {}", conn_id, endpoint, e);
            fail(e.to_string());
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let handshake = OutboundEnvelope::stamp(&OutboundMessage::Handshake, &session_id);
    let frame = match serde_json::to_string(&handshake) {
        Ok(frame) => frame,
        Err(e) => {
            fail(e.to_string());
            return;
        }
    };
    if let Err(e) = write.send(Message::Text(frame)).await {
        warn!("Connection {} failed to send handshake: {}", conn_id, e);
        fail(e.to_string());
        return;
    }

    // A close requested while dialing still wins
    if state
        .compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
    {
        info!("Connection {} open to {}", conn_id, endpoint);
        sink.emit(TransportSignal::Open);
    }

    let (code, reason) = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => sink.emit(TransportSignal::Message(text)),
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection {} read error: {}", conn_id, e);
                    sink.emit(TransportSignal::Error(e.to_string()));
                    break (ABNORMAL_CLOSURE, e.to_string());
                }
                None => break (ABNORMAL_CLOSURE, "stream ended".to_string()),
            },

            cmd = outbound_rx.recv() => {
                let (code, reason) = match cmd {
                    Some(Outgoing::Frame(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!("Connection {} write error: {}", conn_id, e);
                            sink.emit(TransportSignal::Error(e.to_string()));
                            break (ABNORMAL_CLOSURE, e.to_string());
                        }
                        continue;
                    }
                    Some(Outgoing::Close { code, reason }) => (code, reason),
                    None => (NORMAL_CLOSURE, String::new()),
                };
                state.store(ReadyState::Closing as u8, Ordering::Release);
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.clone().into(),
                };
                let _ = write.send(Message::Close(Some(frame))).await;
                break (code, reason);
            }
        }
    };

    state.store(ReadyState::Closed as u8, Ordering::Release);
    info!("Connection {} closed ({}) {}", conn_id, code, reason);
    sink.emit(TransportSignal::Close { code, reason });
}

/// The connection currently used for outbound traffic
///
/// Shared by the supervisor, which swaps it on reconnect, and the facade,
/// which sends through whatever is current.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLink(Arc<RwLock<Option<Connection>>>);

impl ConnectionLink {
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        self.0
            .read()
            .as_ref()
            .map(|conn| conn.send(message))
            .unwrap_or(false)
    }

    pub fn is_open(&self) -> bool {
        self.0.read().as_ref().map(Connection::is_open).unwrap_or(false)
    }

    /// Install a new connection, returning the previous one
    pub fn replace(&self, conn: Connection) -> Option<Connection> {
        self.0.write().replace(conn)
    }

    pub fn take(&self) -> Option<Connection> {
        self.0.write().take()
    }
}

/// Build the socket endpoint: base URL plus one segment for the session id
///
/// An absent or empty session id maps to the literal `default`.
pub fn endpoint_for(base_url: &str, session_id: Option<&str>) -> Result<String> {
    let invalid = |message: &str| SessionError::InvalidEndpoint {
        url: base_url.to_string(),
        message: message.to_string(),
    };

    let mut url = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(invalid("scheme must be ws or wss"));
    }

    let segment = session_id.filter(|s| !s.is_empty()).unwrap_or("default");
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot take a path"))?
        .pop_if_empty()
        .push(segment);

    Ok(url.to_string())
}
