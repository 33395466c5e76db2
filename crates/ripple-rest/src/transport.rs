//! REST transport
//!
//! The seam between the rate limiter and the wire. The limiter only ever
//! sees [`RestResponse`] values, so tests can drive it with scripted
//! transports and no network.

use crate::request::RestRequest;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use ripple_common::ClientConfig;
use ripple_core::{RippleError, RippleResult};
use serde_json::Value;

/// Requests remaining in the bucket before depletion
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Seconds until the bucket's quota resets (float)
pub const HEADER_RESET_AFTER: &str = "X-RateLimit-Reset-After";
/// Total request quota of the bucket
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";

/// Audit-log reason header
const HEADER_AUDIT_REASON: &str = "X-Audit-Log-Reason";

/// A REST response reduced to what the rate limiter needs
#[derive(Debug, Clone)]
pub struct RestResponse {
    /// HTTP status
    pub status: u16,
    /// Parsed `X-RateLimit-Remaining` header
    pub remaining: Option<u32>,
    /// Parsed `X-RateLimit-Reset-After` header, in seconds
    pub reset_after: Option<f64>,
    /// Parsed `X-RateLimit-Limit` header
    pub limit: Option<u32>,
    /// Decoded body: JSON when possible, else the raw text
    pub body: Value,
}

impl RestResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the request itself was rejected for being rate limited
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Whether this response used the bucket's last permit
    ///
    /// A 429 does not count: the request was rejected, not spent.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        !self.is_rate_limited() && self.remaining == Some(0)
    }

    /// The `retry_after` duration carried in a 429 body, in seconds
    #[must_use]
    pub fn retry_after(&self) -> Option<f64> {
        if !self.is_rate_limited() {
            return None;
        }
        self.body.get("retry_after").and_then(Value::as_f64)
    }
}

/// Sends one [`RestRequest`] and reduces the answer to a [`RestResponse`]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RestRequest) -> RippleResult<RestResponse>;
}

/// Production transport over a shared `reqwest` client
pub struct HttpTransport {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl HttpTransport {
    /// Build a transport from the client configuration
    pub fn new(config: &ClientConfig) -> RippleResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.rest.user_agent.clone())
            .build()
            .map_err(|e| RippleError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.rest.api_base.clone(),
            token: config.token.clone(),
        })
    }

    fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers.get(name)?.to_str().ok()?.parse().ok()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RestRequest) -> RippleResult<RestResponse> {
        let url = request.route.url(&self.api_base);
        let mut builder = self
            .http
            .request(request.route.method().clone(), url)
            .header(AUTHORIZATION, format!("Bot {}", self.token));

        if let Some(reason) = &request.reason {
            builder = builder.header(HEADER_AUDIT_REASON, reason);
        }

        if request.parts.is_empty() {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        } else {
            let mut form = reqwest::multipart::Form::new();

            if let Some(body) = &request.body {
                form = form.text("payload_json", serde_json::to_string(body)?);
            }
            for part in &request.parts {
                let mut piece = reqwest::multipart::Part::bytes(part.bytes.clone());
                if let Some(filename) = &part.filename {
                    piece = piece.file_name(filename.clone());
                }
                form = form.part(part.name.clone(), piece);
            }
            builder = builder.multipart(form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RippleError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let remaining = Self::parse_header(headers, HEADER_REMAINING);
        let reset_after = Self::parse_header(headers, HEADER_RESET_AFTER);
        let limit = Self::parse_header(headers, HEADER_LIMIT);

        let text = response
            .text()
            .await
            .map_err(|e| RippleError::Transport(e.to_string()))?;

        // Proxies answer with plain text; keep whatever came back
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(RestResponse {
            status,
            remaining,
            reset_after,
            limit,
            body,
        })
    }
}
