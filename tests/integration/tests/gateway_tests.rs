//! Gateway integration tests
//!
//! Full client against the in-process mock gateway: handshake, waiters,
//! collectors, and wildcard fan-out over a real websocket.

use async_trait::async_trait;
use integration_tests::MockGateway;
use ripple_client::{Client, ClientConfig, Connection, EventKey, RippleResult, SessionState};
use ripple_rest::{RestClient, RestRequest, RestResponse, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// These tests never touch REST; the transport refuses everything
struct NoTransport;

#[async_trait]
impl Transport for NoTransport {
    async fn send(&self, _request: &RestRequest) -> RippleResult<RestResponse> {
        Err(ripple_client::RippleError::Transport("no REST in gateway tests".to_string()))
    }
}

fn test_client() -> Client {
    let mut config = ClientConfig::new("test-token");
    config.gateway.heartbeat_jitter = false;

    let rest = Arc::new(RestClient::with_transport(Arc::new(NoTransport), &config));
    Client::with_rest(config, rest)
}

async fn connect(client: &Client, gateway: &MockGateway) -> Connection {
    client
        .connect_to_until_ready(&gateway.url, Duration::from_secs(5))
        .await
        .expect("client did not become ready")
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Vec<Value>>) -> Vec<Value> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event not delivered")
        .expect("channel closed")
}

#[tokio::test]
async fn test_connects_and_captures_session_id() {
    let gateway = MockGateway::start().await.unwrap();
    let client = test_client();

    let connection = connect(&client, &gateway).await;

    assert_eq!(connection.state(), SessionState::Connected);
    assert_eq!(connection.session().session_id(), gateway.session_id);
    // READY carried sequence 1
    assert_eq!(connection.session().sequence(), 1);

    connection.close();
    connection.closed().await.unwrap();
}

#[tokio::test]
async fn test_collector_batches_five_messages() {
    let gateway = MockGateway::start().await.unwrap();
    let client = test_client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.collect(EventKey::MessageCreate, 5, None, move |values| {
        let tx = tx.clone();
        async move {
            tx.send(values).ok();
        }
    });

    let connection = connect(&client, &gateway).await;

    for id in 1..=5 {
        gateway.dispatch("MESSAGE_CREATE", json!({"id": id}));
    }

    let batch = recv(&mut rx).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(
        batch[0],
        json!([{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}, {"id": 5}])
    );

    // One batch and nothing more
    assert!(rx.try_recv().is_err());

    connection.close();
    connection.closed().await.unwrap();
}

#[tokio::test]
async fn test_wait_for_matches_predicate() {
    let gateway = MockGateway::start().await.unwrap();
    let client = Arc::new(test_client());

    let connection = connect(&client, &gateway).await;

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .wait_for(EventKey::MessageCreate, Some(Duration::from_secs(5)), |values| {
                    values[0]["id"] == json!(3)
                })
                .await
        })
    };

    // Let the waiter register before feeding events
    while client.dispatcher().registered(&EventKey::MessageCreate) == 0 {
        tokio::task::yield_now().await;
    }

    for id in 1..=3 {
        gateway.dispatch("MESSAGE_CREATE", json!({"id": id}));
    }

    let values = waiter.await.unwrap().unwrap();
    assert_eq!(values[0], json!({"id": 3}));

    connection.close();
    connection.closed().await.unwrap();
}

#[tokio::test]
async fn test_wildcard_listener_sees_every_event() {
    let gateway = MockGateway::start().await.unwrap();
    let client = test_client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(EventKey::Wildcard, move |values| {
        let tx = tx.clone();
        async move {
            tx.send(values).ok();
        }
    });

    let connection = connect(&client, &gateway).await;

    // The wildcard already saw READY during the handshake
    let ready = recv(&mut rx).await;
    assert_eq!(ready[0], json!("READY"));

    gateway.dispatch("TYPING_START", json!({"user_id": 7}));
    let typing = recv(&mut rx).await;
    assert_eq!(typing[0], json!("TYPING_START"));
    assert_eq!(typing[1], json!({"user_id": 7}));

    // Unknown event names still fan out through the wildcard
    gateway.dispatch("SOME_FUTURE_EVENT", json!({"x": 1}));
    let unknown = recv(&mut rx).await;
    assert_eq!(unknown[0], json!("SOME_FUTURE_EVENT"));

    connection.close();
    connection.closed().await.unwrap();
}

#[tokio::test]
async fn test_sequence_tracks_dispatch_order() {
    let gateway = MockGateway::start().await.unwrap();
    let client = test_client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(EventKey::MessageCreate, move |values| {
        let tx = tx.clone();
        async move {
            tx.send(values).ok();
        }
    });

    let connection = connect(&client, &gateway).await;
    let session = connection.session();

    let mut last_seen = session.sequence();
    for id in 1..=10 {
        gateway.dispatch("MESSAGE_CREATE", json!({"id": id}));
        recv(&mut rx).await;

        let current = session.sequence();
        assert!(current >= last_seen, "sequence went backwards: {last_seen} -> {current}");
        last_seen = current;
    }

    connection.close();
    connection.closed().await.unwrap();
}
