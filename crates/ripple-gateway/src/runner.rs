//! Gateway session runner
//!
//! Drives one realtime connection through its lifecycle: connect, hello,
//! identify or resume, the read loop, and reconnect classification. The
//! heartbeat pacer runs beside the read loop and force-closes the connection
//! when a beat goes unacknowledged for a full cycle.

use crate::session::{Session, SessionState};
use crate::socket::{self, FrameSender, Reader};
use futures_util::StreamExt;
use rand::Rng;
use ripple_common::GatewayConfig;
use ripple_core::{
    CloseCode, EventKey, GatewayFrame, IdentifyPayload, OpCode, ResumePayload, RippleError,
    RippleResult,
};
use ripple_dispatch::EventDispatcher;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// How long to wait for the server's Hello before giving up on the attempt
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);
/// First reconnect backoff step
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Backoff ceiling
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Why the read loop ended
enum LoopExit {
    /// The application asked for a permanent shutdown
    Shutdown,
    /// Recoverable: transport close/error, server Reconnect, missed ack
    Reconnect,
    /// The server rejected our identify or resume
    InvalidSession { resumable: bool },
    /// The close code forbids another attempt
    Fatal(String),
}

/// Owns one websocket connection and its protocol lifecycle
///
/// Dispatch payloads flow outward through the [`EventDispatcher`]; everything
/// else the session answers internally.
pub struct GatewaySession {
    token: String,
    config: GatewayConfig,
    url: String,
    dispatcher: Arc<EventDispatcher>,
    session: Arc<Session>,
    shutdown: watch::Sender<bool>,
}

impl GatewaySession {
    /// Create a session that will connect to `url`
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        config: GatewayConfig,
        url: impl Into<String>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            token: token.into(),
            config,
            url: url.into(),
            dispatcher,
            session: Arc::new(Session::new()),
            shutdown,
        }
    }

    /// Shared handle to the session state
    #[must_use]
    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Ask the session to shut down for good; `run` returns soon after
    pub fn close(&self) {
        self.session.mark_closed();
        let _ = self.shutdown.send(true);
    }

    /// Drive the connection until closed or dead
    ///
    /// Recoverable losses re-run the full connect path, resuming when a
    /// session id is known. Returns an error only for unrecoverable
    /// conditions: repeated invalid sessions, a fatal close code, or
    /// exhausted connection attempts.
    pub async fn run(&self) -> RippleResult<()> {
        let mut failed_attempts: u32 = 0;

        loop {
            if self.session.is_closed() {
                return Ok(());
            }

            match self.connect_once().await {
                Ok(LoopExit::Shutdown) => {
                    self.session.mark_closed();
                    return Ok(());
                }
                Ok(LoopExit::Reconnect) => {
                    failed_attempts = 0;
                    self.session.set_state(SessionState::Reconnecting);
                    tracing::info!(resume = self.session.can_resume(), "reconnecting");
                }
                Ok(LoopExit::InvalidSession { resumable }) => {
                    failed_attempts = 0;

                    if !resumable {
                        self.session.reset_identity();
                    }
                    let streak = self.session.count_invalid_session();
                    if streak >= self.config.max_invalid_sessions {
                        self.session.set_state(SessionState::Closed);
                        return Err(RippleError::GatewayDisconnected(format!(
                            "session invalidated {streak} times in a row"
                        )));
                    }

                    self.session.set_state(SessionState::Reconnecting);
                    tracing::warn!(streak, resumable, "session invalidated, retrying handshake");
                }
                Ok(LoopExit::Fatal(reason)) => {
                    self.session.set_state(SessionState::Closed);
                    return Err(RippleError::GatewayDisconnected(reason));
                }
                Err(e) => {
                    failed_attempts += 1;

                    if failed_attempts >= self.config.max_reconnect_attempts {
                        self.session.set_state(SessionState::Closed);
                        return Err(RippleError::Gateway(format!(
                            "giving up after {failed_attempts} failed connection attempts: {e}"
                        )));
                    }

                    let delay = Self::backoff(failed_attempts);
                    tracing::warn!(
                        error = %e,
                        attempt = failed_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "connection attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One full connect / handshake / read-loop pass
    async fn connect_once(&self) -> RippleResult<LoopExit> {
        self.session.set_state(SessionState::Connecting);
        self.session.reset_liveness();

        let socket = socket::connect(&self.url).await?;
        self.session.set_state(SessionState::AwaitingHello);

        let (sender, mut reader) = socket::split(socket);

        let mut shutdown = self.shutdown.subscribe();
        let hello = tokio::select! {
            _ = shutdown.wait_for(|closed| *closed) => {
                sender.close().await;
                return Ok(LoopExit::Shutdown);
            }
            result = tokio::time::timeout(HELLO_TIMEOUT, Self::next_frame(&mut reader)) => {
                result.map_err(|_| RippleError::Gateway("timed out waiting for hello".to_string()))??
            }
        };
        let interval = hello
            .as_hello()
            .ok_or_else(|| RippleError::Gateway(format!("expected hello, got {hello}")))?;
        let interval = Duration::from_millis(interval.heartbeat_interval);
        self.session.set_heartbeat_interval(interval);

        self.session.set_state(SessionState::Identifying);
        if self.session.can_resume() {
            let resume =
                ResumePayload::new(self.token.clone(), self.session.session_id(), self.session.sequence());
            sender.send(&GatewayFrame::resume(&resume)).await?;
        } else {
            let identify = IdentifyPayload::new(self.token.clone(), self.config.intents);
            sender.send(&GatewayFrame::identify(&identify)).await?;
        }

        let (beat_failure_tx, mut beat_failure_rx) = mpsc::channel::<()>(1);
        let pacer = self.spawn_pacer(sender.clone(), interval, beat_failure_tx);

        let exit = self.read_loop(&sender, &mut reader, &mut beat_failure_rx).await;
        pacer.abort();

        exit
    }

    /// Read until the next decodable frame, skipping malformed ones
    async fn next_frame(reader: &mut Reader) -> RippleResult<GatewayFrame> {
        while let Some(message) = reader.next().await {
            let message = message.map_err(|e| RippleError::Gateway(e.to_string()))?;

            if let Message::Text(text) = message {
                match GatewayFrame::from_json(&text) {
                    Ok(frame) => return Ok(frame),
                    Err(e) => tracing::warn!(error = %e, "skipping undecodable frame"),
                }
            }
        }

        Err(RippleError::Gateway("connection closed during handshake".to_string()))
    }

    /// Translate inbound frames until the connection ends
    async fn read_loop(
        &self,
        sender: &FrameSender,
        reader: &mut Reader,
        beat_failure: &mut mpsc::Receiver<()>,
    ) -> RippleResult<LoopExit> {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => {
                    sender.close().await;
                    return Ok(LoopExit::Shutdown);
                }
                _ = beat_failure.recv() => {
                    tracing::warn!("heartbeat unacknowledged for a full cycle, forcing reconnect");
                    sender.close().await;
                    return Ok(LoopExit::Reconnect);
                }
                message = reader.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(exit) = self.handle_frame(sender, &text).await? {
                            return Ok(exit);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Ok(self.classify_close(frame.as_ref()));
                    }
                    // Ping/pong are answered at the protocol layer; binary
                    // frames are not part of this gateway's encoding
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket error, reconnecting");
                        return Ok(LoopExit::Reconnect);
                    }
                    None => {
                        tracing::warn!("websocket stream ended, reconnecting");
                        return Ok(LoopExit::Reconnect);
                    }
                }
            }
        }
    }

    /// Handle one text frame; `Some(exit)` ends the read loop
    async fn handle_frame(&self, sender: &FrameSender, text: &str) -> RippleResult<Option<LoopExit>> {
        let frame = match GatewayFrame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable frame");
                return Ok(None);
            }
        };

        // Sequence numbers apply in frame-arrival order
        if let Some(sequence) = frame.s {
            self.session.observe_sequence(sequence);
        }

        match frame.op {
            OpCode::Dispatch => {
                if let Some((name, payload)) = frame.as_dispatch() {
                    self.handle_dispatch(name, payload);
                }
                Ok(None)
            }
            OpCode::Heartbeat => {
                // The server may request an immediate beat
                sender.send_heartbeat(&GatewayFrame::heartbeat(self.session.sequence())).await?;
                Ok(None)
            }
            OpCode::HeartbeatAck => {
                self.session.record_ack();
                tracing::trace!(latency = ?self.session.latency(), "heartbeat acknowledged");
                Ok(None)
            }
            OpCode::Reconnect => {
                tracing::info!("server requested reconnect");
                sender.close().await;
                Ok(Some(LoopExit::Reconnect))
            }
            OpCode::InvalidSession => {
                let resumable = frame.invalid_session_resumable();
                sender.close().await;
                Ok(Some(LoopExit::InvalidSession { resumable }))
            }
            other => {
                tracing::debug!(op = %other, "ignoring unexpected opcode");
                Ok(None)
            }
        }
    }

    /// Forward a dispatch to the event engine, tracking session identity
    fn handle_dispatch(&self, name: &str, payload: Value) {
        let key = EventKey::from_wire(name);

        match key {
            EventKey::Ready => {
                if let Some(session_id) = payload.get("session_id").and_then(Value::as_str) {
                    self.session.set_session_id(session_id);
                }
                self.session.set_state(SessionState::Connected);
                self.session.reset_invalid_sessions();
            }
            EventKey::Resumed => {
                self.session.set_state(SessionState::Connected);
                self.session.reset_invalid_sessions();
            }
            _ => {}
        }

        self.dispatcher.dispatch(&key, vec![payload]);
    }

    /// Decide what a server-sent close frame means for the session
    fn classify_close(&self, frame: Option<&CloseFrame<'_>>) -> LoopExit {
        let code = frame.and_then(|f| CloseCode::from_u16(u16::from(f.code)));

        match code {
            Some(code) if !code.should_reconnect() => LoopExit::Fatal(code.to_string()),
            Some(code) => {
                if !code.can_resume() {
                    self.session.reset_identity();
                }
                tracing::info!(%code, "gateway closed the connection, reconnecting");
                LoopExit::Reconnect
            }
            // Plain closes carry no protocol meaning; resume if possible
            None => LoopExit::Reconnect,
        }
    }

    /// Spawn the heartbeat pacer for one connection
    ///
    /// Each cycle checks the previous beat was acknowledged before sending
    /// the next; a missed ack reports a liveness failure and stops the pacer.
    fn spawn_pacer(
        &self,
        sender: FrameSender,
        interval: Duration,
        failure: mpsc::Sender<()>,
    ) -> JoinHandle<()> {
        let session = self.session.clone();
        let jitter = self.config.heartbeat_jitter;

        tokio::spawn(async move {
            let first = if jitter {
                interval.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
            } else {
                interval
            };
            let mut ticker = tokio::time::interval_at(Instant::now() + first, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if !session.is_acked() {
                    let _ = failure.send(()).await;
                    return;
                }

                let beat = GatewayFrame::heartbeat(session.sequence());
                if sender.send_heartbeat(&beat).await.is_err() {
                    return;
                }
                session.record_heartbeat();
                tracing::trace!(sequence = session.sequence(), "heartbeat sent");
            }
        })
    }

    /// Exponential backoff with jitter for failed connection attempts
    fn backoff(attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let base = RECONNECT_BASE_DELAY.saturating_mul(2_u32.saturating_pow(exponent));
        let capped = base.min(RECONNECT_MAX_DELAY);

        capped + capped.mul_f64(rand::thread_rng().gen_range(0.0..0.25))
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("url", &self.url)
            .field("state", &self.session.state())
            .finish()
    }
}
