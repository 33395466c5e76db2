//! Gateway payload definitions
//!
//! Typed payloads carried in the `d` field of handshake frames.

use crate::intents::Intents;
use serde::{Deserialize, Serialize};

/// Library identification reported to the gateway
pub const LIBRARY: &str = concat!("ripple ", env!("CARGO_PKG_VERSION"));

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to authenticate a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Capability flags for this session
    pub intents: Intents,

    /// Client connection properties
    pub properties: ConnectionProperties,
}

impl IdentifyPayload {
    /// Create an Identify payload with default connection properties
    #[must_use]
    pub fn new(token: impl Into<String>, intents: Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            properties: ConnectionProperties::default(),
        }
    }
}

/// Payload for op 6 (Resume)
///
/// Sent instead of Identify when a prior session exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Prior session identifier
    pub session_id: String,

    /// Last sequence number received on the prior connection
    pub seq: u64,
}

impl ResumePayload {
    /// Create a Resume payload
    #[must_use]
    pub fn new(token: impl Into<String>, session_id: impl Into<String>, seq: u64) -> Self {
        Self {
            token: token.into(),
            session_id: session_id.into(),
            seq,
        }
    }
}

/// Client connection properties sent in Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Operating system
    pub os: String,

    /// Client name
    pub browser: String,

    /// Device name
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: LIBRARY.to_string(),
            device: LIBRARY.to_string(),
        }
    }
}
