//! # ripple-client
//!
//! The thin orchestrator: builds the event dispatcher and the rate-limited
//! REST client, resolves the gateway URL, and drives a [`GatewaySession`]
//! whose dispatch frames flow into the dispatcher.

mod client;

pub use client::{Client, Connection};

pub use ripple_common::{ClientConfig, GatewayConfig, RestConfig};
pub use ripple_core::{EventKey, Intents, RippleError, RippleResult};
pub use ripple_dispatch::{EventDispatcher, SubscriptionId};
pub use ripple_gateway::{Session, SessionState};
pub use ripple_rest::{Method, RestClient, Route};
