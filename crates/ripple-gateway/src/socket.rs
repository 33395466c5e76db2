//! Socket plumbing
//!
//! Connects the websocket, owns the writer task, and throttles outbound
//! frames so handshake and heartbeat bursts stay inside the server's frame
//! budget.

use futures_util::{SinkExt, StreamExt};
use ripple_core::{GatewayFrame, RippleError, RippleResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Outbound frames the server tolerates per release window
const SEND_RATE: usize = 2;
/// Release window for the send limiter
const SEND_WINDOW: Duration = Duration::from_secs(1);
/// Outbound channel depth
const SEND_BUFFER: usize = 16;

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type Reader = futures_util::stream::SplitStream<Socket>;

/// Open a websocket to the gateway
pub(crate) async fn connect(url: &str) -> RippleResult<Socket> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| RippleError::Gateway(format!("websocket connect failed: {e}")))?;

    Ok(socket)
}

/// Paces outbound frames: `SEND_RATE` permits, each returned after
/// `SEND_WINDOW` has passed
struct SendLimiter {
    semaphore: Arc<Semaphore>,
    window: Duration,
}

impl SendLimiter {
    fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(SEND_RATE)),
            window: SEND_WINDOW,
        }
    }

    async fn throttle(&self) {
        if let Ok(permit) = self.semaphore.clone().acquire_owned().await {
            let window = self.window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                drop(permit);
            });
        }
    }
}

struct Outbound {
    message: Message,
    /// Heartbeats follow the server's own cadence and skip the throttle
    throttled: bool,
}

/// Handle for queueing outbound frames to the writer task
#[derive(Clone)]
pub(crate) struct FrameSender {
    tx: mpsc::Sender<Outbound>,
}

impl FrameSender {
    /// Queue a frame under the send limiter; fails once the writer has exited
    pub async fn send(&self, frame: &GatewayFrame) -> RippleResult<()> {
        self.queue(frame, true).await
    }

    /// Queue a heartbeat frame, bypassing the send limiter
    pub async fn send_heartbeat(&self, frame: &GatewayFrame) -> RippleResult<()> {
        self.queue(frame, false).await
    }

    async fn queue(&self, frame: &GatewayFrame, throttled: bool) -> RippleResult<()> {
        let json = frame.to_json()?;
        self.tx
            .send(Outbound {
                message: Message::Text(json),
                throttled,
            })
            .await
            .map_err(|_| RippleError::Gateway("gateway writer closed".to_string()))
    }

    /// Queue a close frame
    pub async fn close(&self) {
        let _ = self
            .tx
            .send(Outbound {
                message: Message::Close(None),
                throttled: false,
            })
            .await;
    }
}

/// Split the socket, spawning the writer task
///
/// The writer drains the channel through the send limiter and exits when
/// every [`FrameSender`] clone is dropped.
pub(crate) fn split(socket: Socket) -> (FrameSender, Reader) {
    let (mut sink, reader) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(SEND_BUFFER);

    tokio::spawn(async move {
        let limiter = SendLimiter::new();

        while let Some(outbound) = rx.recv().await {
            if outbound.throttled {
                limiter.throttle().await;
            }

            if let Err(e) = sink.send(outbound.message).await {
                tracing::debug!(error = %e, "gateway write failed");
                break;
            }
        }

        let _ = sink.close().await;
    });

    (FrameSender { tx }, reader)
}
