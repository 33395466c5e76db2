//! REST client
//!
//! Thin convenience surface over the rate limiter: body/multipart helpers
//! and the gateway URL probe.

use crate::limiter::RateLimiter;
use crate::request::{MultipartPart, RestRequest};
use crate::route::Route;
use crate::transport::{HttpTransport, Transport};
use ripple_common::ClientConfig;
use ripple_core::RippleResult;
use serde_json::Value;
use std::sync::Arc;

/// Rate-limited REST API client
pub struct RestClient {
    limiter: RateLimiter,
    gateway_fallback: String,
}

impl RestClient {
    /// Build a client over the production HTTP transport
    pub fn new(config: &ClientConfig) -> RippleResult<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::with_transport(transport, config))
    }

    /// Build a client over a caller-supplied transport
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            limiter: RateLimiter::new(transport, config.rest.global_concurrency),
            gateway_fallback: config.gateway.url.clone(),
        }
    }

    /// The underlying rate limiter
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Perform a bodyless request
    pub async fn request(&self, route: Route) -> RippleResult<Value> {
        self.limiter.perform(RestRequest::new(route)).await
    }

    /// Perform a request with a JSON body
    pub async fn request_with_body(&self, route: Route, body: Value) -> RippleResult<Value> {
        self.limiter.perform(RestRequest::new(route).with_body(body)).await
    }

    /// Perform a request with a JSON body and multipart parts
    pub async fn request_multipart(
        &self,
        route: Route,
        body: Option<Value>,
        parts: Vec<MultipartPart>,
    ) -> RippleResult<Value> {
        let mut request = RestRequest::new(route);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        request.parts = parts;

        self.limiter.perform(request).await
    }

    /// Perform a fully built request
    pub async fn perform(&self, request: RestRequest) -> RippleResult<Value> {
        self.limiter.perform(request).await
    }

    /// Resolve the websocket URL to connect to
    ///
    /// Asks the gateway-bot endpoint; falls back to the configured URL when
    /// the probe fails or answers without one.
    pub async fn gateway_url(&self) -> String {
        match self.request(Route::get("gateway/bot")).await {
            Ok(body) => body
                .get("url")
                .and_then(Value::as_str)
                .map_or_else(|| self.gateway_fallback.clone(), str::to_string),
            Err(e) => {
                tracing::warn!(error = %e, "gateway url probe failed, using configured url");
                self.gateway_fallback.clone()
            }
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient").field("limiter", &self.limiter).finish()
    }
}
