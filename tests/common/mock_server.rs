//! In-process WebSocket server standing in for the reconstruction backend

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts WebSocket clients on a random local port
pub struct MockServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConn>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("No local addr");
        let (tx, connections) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(conn) = handshake(stream).await {
                        let _ = tx.send(conn);
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            task,
        }
    }

    /// Base URL clients should be configured with
    pub fn base_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Next client connection, failing the test after a timeout
    pub async fn accept(&mut self) -> ServerConn {
        self.accept_within(STEP_TIMEOUT)
            .await
            .expect("No client connected")
    }

    pub async fn accept_within(&mut self, within: Duration) -> Option<ServerConn> {
        tokio::time::timeout(within, self.connections.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handshake(stream: TcpStream) -> Option<ServerConn> {
    let path = Arc::new(Mutex::new(String::new()));
    let seen = path.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *seen.lock() = req.uri().path().to_string();
        Ok(resp)
    };

    let ws = accept_hdr_async(stream, callback).await.ok()?;
    let path = path.lock().clone();
    Some(ServerConn { path, ws })
}

/// Server side of one client connection
pub struct ServerConn {
    /// Request path the client dialed, e.g. `/ws/s-1`
    pub path: String,
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// Next text frame as JSON
    pub async fn recv_json(&mut self) -> Value {
        let next = async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return serde_json::from_str(&text).expect("Client sent invalid JSON")
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("Client went away: {:?}", other),
                }
            }
        };
        tokio::time::timeout(STEP_TIMEOUT, next)
            .await
            .expect("Timed out waiting for a client frame")
    }

    /// Next frame whose `type` matches
    pub async fn recv_type(&mut self, tag: &str) -> Value {
        loop {
            let frame = self.recv_json().await;
            if frame["type"] == tag {
                return frame;
            }
        }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: String) {
        self.ws
            .send(Message::Text(text))
            .await
            .expect("Failed to send to client");
    }

    /// Close with a close frame carrying `code`
    pub async fn close(mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let _ = self.ws.close(Some(frame)).await;
        // Give the close frame time to reach the client before the socket drops
        let _ = tokio::time::timeout(Duration::from_millis(200), async {
            while self.ws.next().await.is_some() {}
        })
        .await;
    }
}
