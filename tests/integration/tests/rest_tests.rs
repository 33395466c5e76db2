//! REST integration tests
//!
//! The real HTTP transport and rate limiter against an axum mock API:
//! 429 backoff, bucket depletion, and the error taxonomy end to end.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use integration_tests::MockApi;
use ripple_client::{ClientConfig, RippleError, Route};
use ripple_rest::RestClient;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn rest_client(api_base: String) -> RestClient {
    let mut config = ClientConfig::new("test-token");
    config.rest.api_base = api_base;

    RestClient::new(&config).expect("failed to build rest client")
}

#[tokio::test]
async fn test_rate_limited_request_retries_transparently() {
    let hits = Arc::new(AtomicU32::new(0));

    async fn limited(State(hits): State<Arc<AtomicU32>>) -> impl IntoResponse {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("X-RateLimit-Remaining", "0"), ("X-RateLimit-Limit", "1")],
                Json(json!({"retry_after": 0.1})),
            )
        } else {
            (
                StatusCode::OK,
                [("X-RateLimit-Remaining", "1"), ("X-RateLimit-Limit", "1")],
                Json(json!({"ok": true})),
            )
        }
    }

    let router = Router::new().route("/limited", get(limited)).with_state(hits.clone());
    let api = MockApi::start(router).await.unwrap();
    let client = rest_client(api.base_url());

    let started = Instant::now();
    let body = client.request(Route::get("limited")).await.unwrap();

    // The caller sees only the eventual 200
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_millis(90), "retry did not back off");
}

#[tokio::test]
async fn test_depleted_bucket_delays_only_its_own_route() {
    async fn depleting() -> impl IntoResponse {
        (
            StatusCode::OK,
            [
                ("X-RateLimit-Remaining", "0"),
                ("X-RateLimit-Reset-After", "0.4"),
                ("X-RateLimit-Limit", "1"),
            ],
            Json(json!({"route": "a"})),
        )
    }

    async fn roomy() -> impl IntoResponse {
        (
            StatusCode::OK,
            [("X-RateLimit-Remaining", "5"), ("X-RateLimit-Limit", "5")],
            Json(json!({"route": "b"})),
        )
    }

    let router = Router::new()
        .route("/a", get(depleting))
        .route("/b", get(roomy));
    let api = MockApi::start(router).await.unwrap();
    let client = Arc::new(rest_client(api.base_url()));

    // First call depletes bucket "a" and closes its gate for 0.4s
    client.request(Route::get("a")).await.unwrap();
    let depleted_at = Instant::now();

    // An unrelated bucket is not stalled by it
    let body = client.request(Route::get("b")).await.unwrap();
    assert_eq!(body, json!({"route": "b"}));
    assert!(depleted_at.elapsed() < Duration::from_millis(300), "unrelated bucket was stalled");

    // The depleted bucket itself waits out the reset interval
    client.request(Route::get("a")).await.unwrap();
    assert!(
        depleted_at.elapsed() >= Duration::from_millis(350),
        "depleted bucket was not held until reset"
    );
}

#[tokio::test]
async fn test_error_statuses_surface_typed() {
    async fn missing() -> impl IntoResponse {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"code": 10003, "message": "Unknown Channel"})),
        )
    }

    async fn forbidden() -> impl IntoResponse {
        (
            StatusCode::FORBIDDEN,
            Json(json!({"code": 50001, "message": "Missing Access"})),
        )
    }

    let router = Router::new()
        .route("/missing", get(missing))
        .route("/forbidden", get(forbidden));
    let api = MockApi::start(router).await.unwrap();
    let client = rest_client(api.base_url());

    let error = client.request(Route::get("missing")).await.unwrap_err();
    match error {
        RippleError::NotFound(api_error) => {
            assert_eq!(api_error.status, 404);
            assert_eq!(api_error.code, 10_003);
            assert_eq!(api_error.message, "Unknown Channel");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }

    let error = client.request(Route::get("forbidden")).await.unwrap_err();
    assert!(matches!(error, RippleError::Forbidden(_)));
}

#[tokio::test]
async fn test_gateway_url_probe() {
    async fn gateway_bot() -> impl IntoResponse {
        Json(json!({"url": "wss://mock.gateway", "session_start_limit": {"total": 1000}}))
    }

    let router = Router::new().route("/gateway/bot", get(gateway_bot));
    let api = MockApi::start(router).await.unwrap();
    let client = rest_client(api.base_url());

    assert_eq!(client.gateway_url().await, "wss://mock.gateway");
}

#[tokio::test]
async fn test_concurrent_calls_share_discovered_capacity() {
    let in_flight = Arc::new(AtomicU32::new(0));
    let max_seen = Arc::new(AtomicU32::new(0));

    #[derive(Clone)]
    struct Gauge {
        in_flight: Arc<AtomicU32>,
        max_seen: Arc<AtomicU32>,
    }

    async fn counted(State(gauge): State<Gauge>) -> impl IntoResponse {
        let current = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.max_seen.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        gauge.in_flight.fetch_sub(1, Ordering::SeqCst);

        (
            StatusCode::OK,
            [("X-RateLimit-Remaining", "1"), ("X-RateLimit-Limit", "3")],
            Json(json!({"ok": true})),
        )
    }

    let router = Router::new().route("/counted", get(counted)).with_state(Gauge {
        in_flight: in_flight.clone(),
        max_seen: max_seen.clone(),
    });
    let api = MockApi::start(router).await.unwrap();
    let client = Arc::new(rest_client(api.base_url()));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.request(Route::get("counted")).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(
        max_seen.load(Ordering::SeqCst) <= 3,
        "bucket capacity exceeded: {}",
        max_seen.load(Ordering::SeqCst)
    );
}
