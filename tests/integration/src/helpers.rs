//! Test helpers
//!
//! A controllable mock gateway over a real websocket and an axum-based mock
//! REST API, both bound to OS-assigned ports.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Heartbeat interval announced by the mock gateway; long enough that tests
/// finish before the first beat is due
pub const MOCK_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// A scripted gateway server for one client connection
///
/// Performs the Hello/Identify/Ready handshake on accept, acknowledges
/// heartbeats, and forwards [`MockGateway::dispatch`] calls as dispatch
/// frames with increasing sequence numbers.
pub struct MockGateway {
    pub url: String,
    pub session_id: String,
    events: mpsc::UnboundedSender<(String, Value)>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Bind and start serving a single connection
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}", listener.local_addr()?);
        let session_id = uuid::Uuid::new_v4().to_string();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let server_session_id = session_id.clone();

        let handle = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            run_gateway(socket, &server_session_id, events_rx).await;
        });

        Ok(Self {
            url,
            session_id,
            events: events_tx,
            _handle: handle,
        })
    }

    /// Queue a dispatch frame for the connected client
    pub fn dispatch(&self, event: &str, payload: Value) {
        self.events.send((event.to_string(), payload)).ok();
    }
}

async fn run_gateway(
    mut socket: WebSocketStream<TcpStream>,
    session_id: &str,
    mut events: mpsc::UnboundedReceiver<(String, Value)>,
) {
    let sequence = AtomicU64::new(0);

    let hello = json!({"op": 10, "d": {"heartbeat_interval": MOCK_HEARTBEAT_INTERVAL_MS}});
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    // Identify (or resume) comes first
    let Some(Ok(Message::Text(_handshake))) = socket.next().await else {
        return;
    };

    let ready = json!({
        "op": 0,
        "t": "READY",
        "s": sequence.fetch_add(1, Ordering::SeqCst) + 1,
        "d": {"session_id": session_id},
    });
    if socket.send(Message::Text(ready.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            queued = events.recv() => match queued {
                Some((event, payload)) => {
                    let frame = json!({
                        "op": 0,
                        "t": event,
                        "s": sequence.fetch_add(1, Ordering::SeqCst) + 1,
                        "d": payload,
                    });
                    if socket.send(Message::Text(frame.to_string())).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            inbound = socket.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    if frame["op"] == 1 {
                        let ack = json!({"op": 11});
                        if socket.send(Message::Text(ack.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// A mock REST API served by axum
pub struct MockApi {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl MockApi {
    /// Serve a router on an OS-assigned port
    pub async fn start(router: axum::Router) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    /// Base URL suitable for `RestConfig::api_base`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}
