//! REST requests
//!
//! One ephemeral value per call: the route, an optional JSON body, optional
//! multipart parts, and an optional audit-log reason.

use crate::route::Route;
use serde_json::Value;

/// A single REST call
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub route: Route,
    pub body: Option<Value>,
    pub parts: Vec<MultipartPart>,
    pub reason: Option<String>,
}

impl RestRequest {
    /// Create a request with no body
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            parts: Vec::new(),
            reason: None,
        }
    }

    /// Attach a JSON body
    ///
    /// With multipart parts present, the body is sent as the `payload_json`
    /// form field instead.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach one multipart part
    #[must_use]
    pub fn with_part(
        mut self,
        name: impl Into<String>,
        filename: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            filename,
            bytes,
        });
        self
    }

    /// Attach an audit-log reason header
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One part of a multipart upload
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}
