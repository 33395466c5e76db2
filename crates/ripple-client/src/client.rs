//! Client orchestration
//!
//! Wires the pieces together: one dispatcher, one REST client, and one
//! gateway session per connection.

use parking_lot::Mutex;
use ripple_common::ClientConfig;
use ripple_core::{EventKey, RippleError, RippleResult};
use ripple_dispatch::{EventDispatcher, SubscriptionId};
use ripple_gateway::{GatewaySession, Session, SessionState};
use ripple_rest::RestClient;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The realtime client
///
/// Owns the event dispatcher and the REST client; `connect` spawns a gateway
/// session feeding the dispatcher.
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<EventDispatcher>,
    rest: Arc<RestClient>,
}

impl Client {
    /// Build a client over the production REST transport
    pub fn new(config: ClientConfig) -> RippleResult<Self> {
        let rest = Arc::new(RestClient::new(&config)?);
        Ok(Self::with_rest(config, rest))
    }

    /// Build a client over a caller-supplied REST client
    #[must_use]
    pub fn with_rest(config: ClientConfig, rest: Arc<RestClient>) -> Self {
        Self {
            config,
            dispatcher: Arc::new(EventDispatcher::new()),
            rest,
        }
    }

    /// The event dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// The rate-limited REST client
    #[must_use]
    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    // === Subscription passthroughs ===

    /// Register a persistent listener
    pub fn on<F, Fut>(&self, key: EventKey, callback: F) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.on(key, callback)
    }

    /// Register a one-shot listener
    pub fn once<F, Fut>(&self, key: EventKey, callback: F) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.once(key, callback)
    }

    /// Register a batching collector
    pub fn collect<F, Fut>(
        &self,
        key: EventKey,
        capacity: usize,
        timeout: Option<Duration>,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.collect(key, capacity, timeout, callback)
    }

    /// Wait for the next event matching the predicate
    pub async fn wait_for<P>(
        &self,
        key: EventKey,
        timeout: Option<Duration>,
        predicate: P,
    ) -> RippleResult<Vec<Value>>
    where
        P: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        self.dispatcher.wait_for(key, timeout, predicate).await
    }

    // === Connection ===

    /// Resolve the gateway URL and open a connection
    pub async fn connect(&self) -> Connection {
        let url = self.rest.gateway_url().await;
        self.connect_to(url)
    }

    /// Open a connection to a specific gateway URL
    #[must_use]
    pub fn connect_to(&self, url: impl Into<String>) -> Connection {
        let url = url.into();
        tracing::info!(%url, "starting gateway session");

        let session = Arc::new(GatewaySession::new(
            self.config.token.clone(),
            self.config.gateway.clone(),
            url,
            self.dispatcher.clone(),
        ));
        let handle = {
            let session = session.clone();
            tokio::spawn(async move { session.run().await })
        };

        Connection {
            state: session.session(),
            session,
            handle,
        }
    }

    /// Connect and wait for the first Ready dispatch
    ///
    /// The connection is torn down again if Ready does not arrive in time.
    pub async fn connect_until_ready(&self, timeout: Duration) -> RippleResult<Connection> {
        let url = self.rest.gateway_url().await;
        self.connect_to_until_ready(url, timeout).await
    }

    /// Connect to a specific URL and wait for the first Ready dispatch
    pub async fn connect_to_until_ready(
        &self,
        url: impl Into<String>,
        timeout: Duration,
    ) -> RippleResult<Connection> {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let slot = Arc::new(Mutex::new(Some(tx)));

        // Registered before the session spawns, so Ready cannot slip past
        self.dispatcher.once(EventKey::Ready, move |_| {
            let slot = slot.clone();
            async move {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(());
                }
            }
        });

        let connection = self.connect_to(url);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(connection),
            Ok(Err(_)) | Err(_) => {
                connection.close();
                Err(RippleError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Handle to one spawned gateway connection
pub struct Connection {
    session: Arc<GatewaySession>,
    state: Arc<Session>,
    handle: JoinHandle<RippleResult<()>>,
}

impl Connection {
    /// Ask the session to shut down for good
    pub fn close(&self) {
        self.session.close();
    }

    /// Wait for the session to end
    ///
    /// `Ok` after an application close; an error for unrecoverable
    /// terminations (fatal close code, repeated invalid sessions, exhausted
    /// reconnect attempts).
    pub async fn closed(self) -> RippleResult<()> {
        self.handle
            .await
            .map_err(|e| RippleError::Gateway(format!("session task failed: {e}")))?
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    /// Heartbeat round-trip latency, once measured
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.state.latency()
    }

    /// Shared session state handle
    #[must_use]
    pub fn session(&self) -> Arc<Session> {
        self.state.clone()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("state", &self.state()).finish()
    }
}
