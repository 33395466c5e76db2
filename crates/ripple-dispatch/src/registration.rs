//! Registration kinds
//!
//! The four ways application code can subscribe to an event key, and the
//! per-key collection that owns them.

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Identifies one registration for explicit removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Callback invoked with the published values
pub type Callback = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Predicate deciding whether a registration matches the published values
pub type Predicate = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// The always-true default predicate
pub(crate) fn match_all() -> Predicate {
    Arc::new(|_| true)
}

/// A persistent callback
pub(crate) struct Listener {
    pub id: SubscriptionId,
    pub callback: Callback,
    pub predicate: Predicate,
}

/// A callback removed after its first match
pub(crate) struct OnceListener {
    pub id: SubscriptionId,
    pub callback: Callback,
    pub predicate: Predicate,
}

/// A pending single-value completion
pub(crate) struct Waiter {
    pub id: SubscriptionId,
    pub tx: oneshot::Sender<Vec<Value>>,
    pub predicate: Predicate,
}

/// Batches matching events until `capacity` is reached, then fires once
/// with the collected values zipped by argument position
pub(crate) struct Collector {
    pub id: SubscriptionId,
    pub callback: Callback,
    pub predicate: Predicate,
    pub capacity: usize,
    pub timeout: Option<Duration>,
    buffer: Vec<Vec<Value>>,
    first_at: Option<Instant>,
}

impl Collector {
    pub fn new(
        id: SubscriptionId,
        callback: Callback,
        predicate: Predicate,
        capacity: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            callback,
            predicate,
            capacity,
            timeout,
            buffer: Vec::new(),
            first_at: None,
        }
    }

    /// Append one published value set, returning the full batch once the
    /// buffer reaches capacity.
    ///
    /// A partial batch whose first item is older than the configured timeout
    /// is discarded before the append; the new values start a fresh batch.
    pub fn push(&mut self, values: Vec<Value>, now: Instant) -> Option<Vec<Vec<Value>>> {
        if let (Some(timeout), Some(first_at)) = (self.timeout, self.first_at) {
            if now.duration_since(first_at) > timeout {
                tracing::debug!(discarded = self.buffer.len(), "discarding timed-out collector batch");
                self.buffer.clear();
                self.first_at = None;
            }
        }

        if self.buffer.is_empty() {
            self.first_at = Some(now);
        }
        self.buffer.push(values);

        if self.buffer.len() >= self.capacity {
            self.first_at = None;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Number of buffered value sets
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Zip collected rows into one list per argument position
///
/// `capacity` rows of `k` values each become `k` arrays of `capacity`
/// values. Rows shorter than the widest row are padded with `null`.
pub(crate) fn zip_by_position(rows: &[Vec<Value>]) -> Vec<Value> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);

    (0..width)
        .map(|pos| {
            Value::Array(
                rows.iter()
                    .map(|row| row.get(pos).cloned().unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .collect()
}

/// All registrations held under one event key
///
/// Dispatch order within one publish is fixed: waiters, then one-shot
/// listeners, then persistent listeners, then collectors. Within each kind,
/// registration order.
#[derive(Default)]
pub(crate) struct EventRegistry {
    pub waiters: Vec<Waiter>,
    pub once: Vec<OnceListener>,
    pub listeners: Vec<Listener>,
    pub collectors: Vec<Collector>,
}

impl EventRegistry {
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
            && self.once.is_empty()
            && self.listeners.is_empty()
            && self.collectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.len() + self.once.len() + self.listeners.len() + self.collectors.len()
    }

    /// Remove a registration of any kind by id
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.len();

        self.waiters.retain(|w| w.id != id);
        self.once.retain(|l| l.id != id);
        self.listeners.retain(|l| l.id != id);
        self.collectors.retain(|c| c.id != id);

        self.len() < before
    }
}
