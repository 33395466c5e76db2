//! Event dispatcher
//!
//! Routes published events to registered waiters, one-shot listeners,
//! persistent listeners, and collectors, in that order. Matched callbacks are
//! spawned as independent tasks; `dispatch` itself never awaits a handler, so
//! a blocking or panicking callback cannot delay the publisher or starve the
//! remaining registrations.

use crate::registration::{
    match_all, zip_by_position, Callback, Collector, EventRegistry, Listener, OnceListener,
    Predicate, SubscriptionId, Waiter,
};
use parking_lot::Mutex;
use ripple_core::{EventKey, RippleError, RippleResult};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Routes `(event key, values)` tuples to matching registrations
///
/// Registrations for a key are kept in registration order; wildcard
/// registrations match every dispatch and receive the concrete event name
/// prepended to the values.
#[derive(Default)]
pub struct EventDispatcher {
    registries: Mutex<HashMap<EventKey, EventRegistry>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn boxed<F, Fut>(callback: F) -> Callback
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Arc::new(move |values| -> futures::future::BoxFuture<'static, ()> {
            Box::pin(callback(values))
        })
    }

    // === Subscribe API ===

    /// Register a persistent listener
    pub fn on<F, Fut>(&self, key: EventKey, callback: F) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_listener(key, match_all(), Self::boxed(callback))
    }

    /// Register a persistent listener with a predicate
    pub fn on_filtered<P, F, Fut>(&self, key: EventKey, predicate: P, callback: F) -> SubscriptionId
    where
        P: Fn(&[Value]) -> bool + Send + Sync + 'static,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_listener(key, Arc::new(predicate), Self::boxed(callback))
    }

    /// Register a listener removed after its first match
    pub fn once<F, Fut>(&self, key: EventKey, callback: F) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_once(key, match_all(), Self::boxed(callback))
    }

    /// Register a one-shot listener with a predicate
    pub fn once_filtered<P, F, Fut>(&self, key: EventKey, predicate: P, callback: F) -> SubscriptionId
    where
        P: Fn(&[Value]) -> bool + Send + Sync + 'static,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_once(key, Arc::new(predicate), Self::boxed(callback))
    }

    /// Register a collector that batches `capacity` matching events
    ///
    /// The callback receives the collected values zipped by argument
    /// position: `capacity` events of `k` values each become `k` arrays of
    /// `capacity` values. A partial batch older than `timeout` is discarded.
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
        self.add_collector(key, match_all(), Self::boxed(callback), capacity, timeout)
    }

    /// Register a collector with a predicate
    pub fn collect_filtered<P, F, Fut>(
        &self,
        key: EventKey,
        capacity: usize,
        timeout: Option<Duration>,
        predicate: P,
        callback: F,
    ) -> SubscriptionId
    where
        P: Fn(&[Value]) -> bool + Send + Sync + 'static,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_collector(key, Arc::new(predicate), Self::boxed(callback), capacity, timeout)
    }

    /// Wait for the next event matching the predicate
    ///
    /// Returns the published values. When the timeout expires first, the
    /// waiter is removed and [`RippleError::Timeout`] is returned.
    pub async fn wait_for<P>(
        &self,
        key: EventKey,
        timeout: Option<Duration>,
        predicate: P,
    ) -> RippleResult<Vec<Value>>
    where
        P: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();

        {
            let mut registries = self.registries.lock();
            registries.entry(key.clone()).or_default().waiters.push(Waiter {
                id,
                tx,
                predicate: Arc::new(predicate),
            });
        }

        let received = match timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.unsubscribe(&key, id);
                    return Err(RippleError::Timeout);
                }
            },
            None => rx.await,
        };

        received.map_err(|_| RippleError::GatewayDisconnected("event dispatcher dropped".to_string()))
    }

    /// Remove a registration of any kind
    ///
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, key: &EventKey, id: SubscriptionId) -> bool {
        let mut registries = self.registries.lock();

        let Some(registry) = registries.get_mut(key) else {
            return false;
        };
        let removed = registry.remove(id);

        if registry.is_empty() {
            registries.remove(key);
        }
        removed
    }

    /// Number of live registrations under a key
    #[must_use]
    pub fn registered(&self, key: &EventKey) -> usize {
        self.registries.lock().get(key).map_or(0, EventRegistry::len)
    }

    // === Publish ===

    /// Route an event to every matching registration
    ///
    /// Evaluation order is fixed: waiters, one-shot listeners, persistent
    /// listeners, collectors; registration order within each kind. After the
    /// per-key pass, wildcard registrations are evaluated against
    /// `[name, ...values]`. Returns how many completions were scheduled.
    pub fn dispatch(&self, key: &EventKey, values: Vec<Value>) -> usize {
        tracing::debug!(event = %key, "dispatching");

        let mut scheduled = self.run_pass(key, &values);

        if !key.is_wildcard() {
            let mut wildcard_values = Vec::with_capacity(values.len() + 1);
            wildcard_values.push(Value::String(key.as_str().to_string()));
            wildcard_values.extend(values);

            scheduled += self.run_pass(&EventKey::Wildcard, &wildcard_values);
        }

        scheduled
    }

    fn run_pass(&self, key: &EventKey, values: &[Value]) -> usize {
        let mut fulfilled = 0;
        let mut to_spawn: Vec<(Callback, Vec<Value>)> = Vec::new();

        {
            let mut registries = self.registries.lock();
            let Some(registry) = registries.get_mut(key) else {
                return 0;
            };

            // Waiters are fulfilled and removed; abandoned ones are pruned.
            let mut i = 0;
            while i < registry.waiters.len() {
                if registry.waiters[i].tx.is_closed() {
                    registry.waiters.remove(i);
                } else if (registry.waiters[i].predicate)(values) {
                    let waiter = registry.waiters.remove(i);
                    if waiter.tx.send(values.to_vec()).is_ok() {
                        fulfilled += 1;
                    }
                } else {
                    i += 1;
                }
            }

            // One-shot listeners leave the registry before their callback
            // runs, so a re-entrant dispatch cannot trigger them twice.
            let mut i = 0;
            while i < registry.once.len() {
                if (registry.once[i].predicate)(values) {
                    let once = registry.once.remove(i);
                    to_spawn.push((once.callback, values.to_vec()));
                } else {
                    i += 1;
                }
            }

            for listener in &registry.listeners {
                if (listener.predicate)(values) {
                    to_spawn.push((listener.callback.clone(), values.to_vec()));
                }
            }

            let now = Instant::now();
            for collector in &mut registry.collectors {
                if (collector.predicate)(values) {
                    if let Some(rows) = collector.push(values.to_vec(), now) {
                        to_spawn.push((collector.callback.clone(), zip_by_position(&rows)));
                    }
                }
            }

            if registry.is_empty() {
                registries.remove(key);
            }
        }

        // Spawn outside the lock; callbacks may subscribe or dispatch freely.
        fulfilled += to_spawn.len();
        for (callback, values) in to_spawn {
            tokio::spawn(callback(values));
        }

        fulfilled
    }

    // === Internal registration ===

    fn add_listener(&self, key: EventKey, predicate: Predicate, callback: Callback) -> SubscriptionId {
        let id = self.next_id();
        self.registries.lock().entry(key).or_default().listeners.push(Listener {
            id,
            callback,
            predicate,
        });
        id
    }

    fn add_once(&self, key: EventKey, predicate: Predicate, callback: Callback) -> SubscriptionId {
        let id = self.next_id();
        self.registries.lock().entry(key).or_default().once.push(OnceListener {
            id,
            callback,
            predicate,
        });
        id
    }

    fn add_collector(
        &self,
        key: EventKey,
        predicate: Predicate,
        callback: Callback,
        capacity: usize,
        timeout: Option<Duration>,
    ) -> SubscriptionId {
        let id = self.next_id();
        let collector = Collector::new(id, callback, predicate, capacity.max(1), timeout);

        self.registries.lock().entry(key).or_default().collectors.push(collector);
        id
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_keys", &self.registries.lock().len())
            .finish()
    }
}
