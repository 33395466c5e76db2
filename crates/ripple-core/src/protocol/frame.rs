//! Gateway frame format
//!
//! Defines the structure for all WebSocket messages exchanged with the
//! gateway: `{"op": <int>, "d": <payload>, "s": <int|null>, "t": <string|null>}`.

use super::{HelloPayload, IdentifyPayload, OpCode, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single gateway wire frame
///
/// All messages sent over the WebSocket connection follow this format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Operation code
    pub op: OpCode,

    /// Event data payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    // === Outbound frames ===

    /// Create a Heartbeat frame (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(sequence: u64) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: Some(Value::Number(sequence.into())),
            s: None,
            t: None,
        }
    }

    /// Create an Identify frame (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self {
            op: OpCode::Identify,
            d: serde_json::to_value(payload).ok(),
            s: None,
            t: None,
        }
    }

    /// Create a Resume frame (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self {
            op: OpCode::Resume,
            d: serde_json::to_value(payload).ok(),
            s: None,
            t: None,
        }
    }

    // === Inbound accessors ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Try to read the dispatch event name and payload (op=0)
    ///
    /// The payload defaults to `null` when `d` is absent.
    pub fn as_dispatch(&self) -> Option<(&str, Value)> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        let name = self.t.as_deref()?;
        Some((name, self.d.clone().unwrap_or(Value::Null)))
    }

    /// Read the resumable flag of an Invalid Session frame (op=9)
    ///
    /// The server sends `d: false` when the session cannot be resumed.
    #[must_use]
    pub fn invalid_session_resumable(&self) -> bool {
        if self.op != OpCode::InvalidSession {
            return false;
        }
        self.d.as_ref().and_then(Value::as_bool).unwrap_or(false)
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayFrame(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayFrame(op={})", self.op)
        }
    }
}
