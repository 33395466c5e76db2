//! Rate limiter
//!
//! Gates outbound REST calls per bucket and under a fixed global concurrency
//! ceiling. Buckets are created lazily at capacity 1 and grown once the
//! server reports their true limit. Depletion closes only the depleted
//! bucket's gate; a timer reopens it and returns the held permit after the
//! server-specified reset interval. 429 responses are retried transparently.

use crate::request::RestRequest;
use crate::transport::{RestResponse, Transport};
use dashmap::DashMap;
use futures::future::BoxFuture;
use ripple_core::{RippleError, RippleResult};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

/// One server-assigned rate-limit scope
///
/// Never destroyed; reused by every request sharing its key.
struct Bucket {
    semaphore: Arc<Semaphore>,
    capacity: AtomicU32,
    gate: watch::Sender<bool>,
}

impl Bucket {
    /// Capacity starts at 1 until the first response reports the true limit
    fn new() -> Self {
        let (gate, _) = watch::channel(true);

        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            capacity: AtomicU32::new(1),
            gate,
        }
    }

    /// Grow the semaphore to the server-reported limit
    ///
    /// Permits are only ever added: the count never exceeds the most recently
    /// reported capacity, and shrinking a live quota is the server's job to
    /// enforce, not ours.
    fn grow_to(&self, limit: u32) {
        let mut current = self.capacity.load(Ordering::Acquire);

        while limit > current {
            match self.capacity.compare_exchange(current, limit, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    self.semaphore.add_permits((limit - current) as usize);
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until the gate is open (it is open by default)
    async fn wait_open(&self) {
        let mut rx = self.gate.subscribe();
        // The sender lives as long as the bucket, so this cannot fail
        let _ = rx.wait_for(|open| *open).await;
    }

    fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        *self.gate.borrow()
    }
}

/// Gates REST calls by bucket and by a global concurrency ceiling
///
/// Permits are always acquired in the fixed order global → bucket → gate.
pub struct RateLimiter {
    transport: Arc<dyn Transport>,
    buckets: DashMap<String, Arc<Bucket>>,
    global: Arc<Semaphore>,
}

impl RateLimiter {
    /// Create a limiter over a transport with the given global ceiling
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, global_concurrency: u32) -> Self {
        Self {
            transport,
            buckets: DashMap::new(),
            global: Arc::new(Semaphore::new(global_concurrency as usize)),
        }
    }

    /// Number of buckets seen so far
    #[must_use]
    pub fn known_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(&self, key: &str) -> Arc<Bucket> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Bucket::new()))
            .clone()
    }

    async fn acquire(semaphore: &Arc<Semaphore>) -> RippleResult<OwnedSemaphorePermit> {
        semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RippleError::Transport("rate limiter shut down".to_string()))
    }

    /// Send a request under its bucket's quota, retrying transient rejections
    ///
    /// Returns the decoded body on success; non-transient errors map through
    /// the typed taxonomy. Boxed because a 429 retries recursively.
    pub fn perform(&self, request: RestRequest) -> BoxFuture<'_, RippleResult<Value>> {
        Box::pin(async move {
            let key = request.route.bucket();
            let bucket = self.bucket(&key);

            // Fixed order: global ceiling, bucket quota, then the gate
            let global_permit = Self::acquire(&self.global).await?;
            let bucket_permit = Self::acquire(&bucket.semaphore).await?;
            bucket.wait_open().await;

            let response = self.transport.send(&request).await?;

            if let Some(limit) = response.limit {
                bucket.grow_to(limit);
            }

            if response.is_depleted() {
                let reset_after = response.reset_after.unwrap_or(0.0);
                tracing::debug!(bucket = %key, reset_after, "bucket depleted, closing gate");

                // The permit stays held across the closure so the quota
                // cannot be overrun while the server resets it.
                bucket.close_gate();
                let timer_bucket = bucket.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs_f64(reset_after)).await;
                    timer_bucket.open_gate();
                    drop(bucket_permit);
                });

                return Self::complete(response);
            }

            if response.is_rate_limited() {
                let retry_after = response.retry_after().unwrap_or(0.0);
                tracing::debug!(bucket = %key, retry_after, "rate limited, retrying after backoff");

                // Release both permits while sleeping so other callers and
                // other buckets keep moving.
                drop(bucket_permit);
                drop(global_permit);
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;

                return self.perform(request).await;
            }

            Self::complete(response)
        })
    }

    fn complete(response: RestResponse) -> RippleResult<Value> {
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(RippleError::from_status(response.status, response.body))
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.buckets.len())
            .field("global_available", &self.global.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use async_trait::async_trait;
    use rand::Rng;
    use serde_json::json;
    use std::sync::Mutex;

    fn ok_response(remaining: u32, limit: u32) -> RestResponse {
        RestResponse {
            status: 200,
            remaining: Some(remaining),
            reset_after: Some(1.0),
            limit: Some(limit),
            body: json!({"ok": true}),
        }
    }

    /// Pops scripted responses per bucket key, repeating the last one
    struct ScriptedTransport {
        responses: Mutex<Vec<RestResponse>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<RestResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &RestRequest) -> RippleResult<RestResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                Ok(responses.remove(0))
            } else {
                Ok(responses[0].clone())
            }
        }
    }

    /// Asserts the per-bucket concurrency limit is never exceeded
    struct ConcurrencyTransport {
        limit: u32,
        in_flight: AtomicU32,
        max_seen: AtomicU32,
    }

    impl ConcurrencyTransport {
        fn new(limit: u32) -> Arc<Self> {
            Arc::new(Self {
                limit,
                in_flight: AtomicU32::new(0),
                max_seen: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for ConcurrencyTransport {
        async fn send(&self, _request: &RestRequest) -> RippleResult<RestResponse> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(current, Ordering::SeqCst);

            // Hold the slot long enough for interleaving to show up
            let jitter = rand::thread_rng().gen_range(1..5);
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ok_response(1, self.limit))
        }
    }

    fn request(path: &str) -> RestRequest {
        RestRequest::new(Route::get(path))
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let transport = ScriptedTransport::new(vec![ok_response(4, 5)]);
        let limiter = RateLimiter::new(transport.clone(), 50);

        let body = limiter.perform(request("channels/1")).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(transport.calls(), 1);
        assert_eq!(limiter.known_buckets(), 1);
    }

    #[tokio::test]
    async fn test_capacity_grows_from_first_response() {
        let transport = ScriptedTransport::new(vec![ok_response(4, 5)]);
        let limiter = RateLimiter::new(transport, 50);

        limiter.perform(request("channels/1")).await.unwrap();

        let bucket = limiter.bucket(&Route::get("channels/1").bucket());
        assert_eq!(bucket.capacity.load(Ordering::SeqCst), 5);
        assert_eq!(bucket.semaphore.available_permits(), 5);
    }

    #[tokio::test]
    async fn test_capacity_never_exceeds_reported_limit() {
        let transport = ScriptedTransport::new(vec![ok_response(4, 5), ok_response(3, 5)]);
        let limiter = RateLimiter::new(transport, 50);

        limiter.perform(request("channels/1")).await.unwrap();
        limiter.perform(request("channels/1")).await.unwrap();

        let bucket = limiter.bucket(&Route::get("channels/1").bucket());
        assert_eq!(bucket.semaphore.available_permits(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_depletion_closes_gate_until_reset() {
        let transport = ScriptedTransport::new(vec![
            RestResponse {
                status: 200,
                remaining: Some(0),
                reset_after: Some(2.0),
                limit: Some(1),
                body: json!({"n": 1}),
            },
            ok_response(1, 1),
        ]);
        let limiter = Arc::new(RateLimiter::new(transport.clone(), 50));

        // The depleting request itself succeeds
        let body = limiter.perform(request("channels/1")).await.unwrap();
        assert_eq!(body, json!({"n": 1}));

        let bucket = limiter.bucket(&Route::get("channels/1").bucket());
        assert!(!bucket.is_open());

        // A second request on the same bucket stalls until the reset timer
        let second = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.perform(request("channels/1")).await })
        };

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(transport.calls(), 1, "gated request must not have been sent yet");

        tokio::time::advance(Duration::from_secs(2)).await;
        second.await.unwrap().unwrap();
        assert_eq!(transport.calls(), 2);
        assert!(bucket.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_depletion_does_not_stall_other_buckets() {
        let transport = ScriptedTransport::new(vec![
            RestResponse {
                status: 200,
                remaining: Some(0),
                reset_after: Some(60.0),
                limit: Some(1),
                body: json!(1),
            },
            ok_response(1, 1),
        ]);
        let limiter = RateLimiter::new(transport.clone(), 50);

        limiter.perform(request("channels/1")).await.unwrap();

        // A different bucket proceeds immediately despite the closed gate
        limiter.perform(request("channels/2")).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retries_transparently() {
        let transport = ScriptedTransport::new(vec![
            RestResponse {
                status: 429,
                remaining: Some(0),
                reset_after: None,
                limit: None,
                body: json!({"retry_after": 0.5}),
            },
            ok_response(1, 1),
        ]);
        let limiter = RateLimiter::new(transport.clone(), 50);

        let body = limiter.perform(request("channels/1")).await.unwrap();

        assert_eq!(body, json!({"ok": true}));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_error_statuses_map_to_taxonomy() {
        for (status, check) in [
            (400, RippleError::BadRequest as fn(ripple_core::ApiError) -> RippleError),
            (401, RippleError::Unauthorized),
            (403, RippleError::Forbidden),
            (404, RippleError::NotFound),
        ] {
            let transport = ScriptedTransport::new(vec![RestResponse {
                status,
                remaining: Some(1),
                reset_after: None,
                limit: None,
                body: json!({"message": "nope"}),
            }]);
            let limiter = RateLimiter::new(transport.clone(), 50);

            let error = limiter.perform(request("channels/1")).await.unwrap_err();
            let expected = check(ripple_core::ApiError::from_body(status, json!({"message": "nope"})));
            assert_eq!(
                std::mem::discriminant(&error),
                std::mem::discriminant(&expected)
            );
            // No retry on non-transient errors
            assert_eq!(transport.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_error_status_is_generic() {
        let transport = ScriptedTransport::new(vec![RestResponse {
            status: 502,
            remaining: Some(1),
            reset_after: None,
            limit: None,
            body: Value::String("Bad Gateway".to_string()),
        }]);
        let limiter = RateLimiter::new(transport, 50);

        let error = limiter.perform(request("channels/1")).await.unwrap_err();
        assert!(matches!(error, RippleError::Api(e) if e.status == 502));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bucket_concurrency_never_exceeds_capacity() {
        let capacity = 3;
        let transport = ConcurrencyTransport::new(capacity);
        let limiter = Arc::new(RateLimiter::new(transport.clone(), 50));

        let mut tasks = Vec::new();
        for _ in 0..40 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.perform(request("channels/1/messages")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let max_seen = transport.max_seen.load(Ordering::SeqCst);
        assert!(
            max_seen <= capacity,
            "observed {max_seen} concurrent requests, capacity is {capacity}"
        );
        // The quota was actually exercised concurrently, not serialized
        assert!(max_seen > 1, "expected concurrent requests, saw {max_seen}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_global_ceiling_caps_unrelated_buckets() {
        let transport = ConcurrencyTransport::new(50);
        let limiter = Arc::new(RateLimiter::new(transport.clone(), 2));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.perform(request(&format!("channels/{i}"))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(transport.max_seen.load(Ordering::SeqCst) <= 2);
    }
}
