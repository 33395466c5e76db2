//! # ripple-gateway
//!
//! One live realtime connection to the gateway: the connect / hello /
//! identify / resume handshake, the heartbeat pacer with its liveness guard,
//! the read loop translating wire opcodes into protocol responses and event
//! dispatches, and the reconnect policy.

mod runner;
mod session;
mod socket;

pub use runner::GatewaySession;
pub use session::{Session, SessionState};
