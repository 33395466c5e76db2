//! Error taxonomy
//!
//! Unified error type surfaced by the REST layer, the gateway session, and
//! the dispatcher. Transient conditions (bucket depletion, 429 backoff,
//! recoverable websocket closes) are retried internally and never appear
//! here.

use serde_json::Value;

/// Convenience alias for results using [`RippleError`]
pub type RippleResult<T> = Result<T, RippleError>;

/// Error body returned by the REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status of the response
    pub status: u16,
    /// API-specific error code, 0 when absent
    pub code: u64,
    /// Human-readable message, empty when absent
    pub message: String,
    /// The raw response body
    pub data: Value,
}

impl ApiError {
    /// Build from a response body, tolerating non-JSON bodies
    ///
    /// The API usually answers with `{"code": n, "message": "..."}` but
    /// proxies can answer with plain text; both are kept.
    #[must_use]
    pub fn from_body(status: u16, body: Value) -> Self {
        let (code, message) = match &body {
            Value::Object(map) => (
                map.get("code").and_then(Value::as_u64).unwrap_or(0),
                map.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
            ),
            Value::String(text) => (0, text.clone()),
            _ => (0, String::new()),
        };

        Self {
            status,
            code,
            message,
            data: body,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status {}, code {})", self.message, self.status, self.code)
    }
}

/// Client-wide error type
#[derive(Debug, thiserror::Error)]
pub enum RippleError {
    // REST errors
    #[error("Bad request: {0}")]
    BadRequest(ApiError),

    #[error("Unauthorized: {0}")]
    Unauthorized(ApiError),

    #[error("Forbidden: {0}")]
    Forbidden(ApiError),

    #[error("Not found: {0}")]
    NotFound(ApiError),

    /// Any other non-2xx REST response
    #[error("API error: {0}")]
    Api(ApiError),

    // Gateway errors
    #[error("Gateway disconnected: {0}")]
    GatewayDisconnected(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    // Dispatch errors
    #[error("Timed out waiting for event")]
    Timeout,

    // Infrastructure errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RippleError {
    /// Map a non-2xx REST response to its typed error
    #[must_use]
    pub fn from_status(status: u16, body: Value) -> Self {
        let error = ApiError::from_body(status, body);

        match status {
            400 => Self::BadRequest(error),
            401 => Self::Unauthorized(error),
            403 => Self::Forbidden(error),
            404 => Self::NotFound(error),
            _ => Self::Api(error),
        }
    }

    /// The API error body, when this error carries one
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::BadRequest(e)
            | Self::Unauthorized(e)
            | Self::Forbidden(e)
            | Self::NotFound(e)
            | Self::Api(e) => Some(e),
            _ => None,
        }
    }
}
