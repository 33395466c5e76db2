//! Session state
//!
//! The mutable state of one gateway connection, shared between the read
//! loop, the heartbeat pacer, and the orchestrator.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Lifecycle of a gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Disconnected,
    /// Opening the websocket
    Connecting,
    /// Socket open, waiting for the server's Hello
    AwaitingHello,
    /// Identify or Resume sent, waiting for Ready
    Identifying,
    /// Live
    Connected,
    /// Connection lost, about to re-run the connect path
    Reconnecting,
    /// Shut down by the application, never reconnects
    Closed,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    heartbeat_interval: Duration,
    sequence: u64,
    session_id: String,
    last_heartbeat: Option<Instant>,
    latency: Option<Duration>,
    acked: bool,
    closed: bool,
    invalid_sessions: u32,
}

/// Shared handle to one session's mutable state
///
/// Mutated by the frame reader and the heartbeat pacer; read by everyone.
#[derive(Debug)]
pub struct Session {
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Fresh state: disconnected, no session id, sequence 0
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                heartbeat_interval: Duration::ZERO,
                sequence: 0,
                session_id: String::new(),
                last_heartbeat: None,
                latency: None,
                // No heartbeat is in flight yet, so nothing is owed an ack
                acked: true,
                closed: false,
                invalid_sessions: 0,
            }),
        }
    }

    // === State ===

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: SessionState) {
        self.inner.lock().state = state;
    }

    /// Whether the application asked for a permanent shutdown
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn mark_closed(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.state = SessionState::Closed;
    }

    // === Heartbeat interval ===

    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.lock().heartbeat_interval
    }

    pub fn set_heartbeat_interval(&self, interval: Duration) {
        self.inner.lock().heartbeat_interval = interval;
    }

    // === Sequence ===

    /// Last sequence number seen on this connection
    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    /// Store a sequence number in frame-arrival order
    pub fn observe_sequence(&self, sequence: u64) {
        self.inner.lock().sequence = sequence;
    }

    // === Session identity ===

    /// Session identifier, empty until the first Ready
    pub fn session_id(&self) -> String {
        self.inner.lock().session_id.clone()
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.inner.lock().session_id = session_id.into();
    }

    /// Whether a Resume is possible instead of a fresh Identify
    pub fn can_resume(&self) -> bool {
        !self.inner.lock().session_id.is_empty()
    }

    /// Discard the session identity before a fresh Identify
    ///
    /// The sequence resets with it; it is only meaningful within the session
    /// that assigned it.
    pub fn reset_identity(&self) {
        let mut inner = self.inner.lock();
        inner.session_id.clear();
        inner.sequence = 0;
    }

    // === Heartbeat liveness ===

    /// Clear liveness bookkeeping when a fresh connection starts
    ///
    /// Without this, a connection that died with an unanswered heartbeat
    /// would trip the liveness guard on the next connection's first tick.
    pub fn reset_liveness(&self) {
        let mut inner = self.inner.lock();
        inner.acked = true;
        inner.last_heartbeat = None;
    }

    /// Record an outbound heartbeat awaiting acknowledgement
    pub fn record_heartbeat(&self) {
        let mut inner = self.inner.lock();
        inner.last_heartbeat = Some(Instant::now());
        inner.acked = false;
    }

    /// Record the server's acknowledgement and measure latency
    pub fn record_ack(&self) {
        let mut inner = self.inner.lock();
        inner.acked = true;
        if let Some(sent) = inner.last_heartbeat {
            inner.latency = Some(sent.elapsed());
        }
    }

    /// Whether the previous heartbeat was acknowledged
    pub fn is_acked(&self) -> bool {
        self.inner.lock().acked
    }

    /// Round-trip latency measured from the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.inner.lock().latency
    }

    // === Invalid session accounting ===

    /// Count a rejected identify/resume, returning the consecutive total
    pub fn count_invalid_session(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.invalid_sessions += 1;
        inner.invalid_sessions
    }

    /// A successful Ready clears the failure streak
    pub fn reset_invalid_sessions(&self) {
        self.inner.lock().invalid_sessions = 0;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
