//! # ripple-dispatch
//!
//! The in-process event dispatch engine. Routes a published
//! `(event key, values)` tuple to all matching registrations: persistent
//! listeners, one-shot listeners, timed batch collectors, and single-value
//! waiters. Every matched callback runs as an independently spawned task so
//! a slow or panicking handler can never stall dispatch.

mod dispatcher;
mod registration;

pub use dispatcher::EventDispatcher;
pub use registration::{Callback, Predicate, SubscriptionId};
