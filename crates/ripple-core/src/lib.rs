//! # ripple-core
//!
//! Protocol vocabulary shared by every other crate: gateway op codes, wire
//! frames, close codes, event keys, intent flags, and the error taxonomy.
//! This crate has zero dependencies on infrastructure (sockets, HTTP, runtime).

pub mod error;
pub mod event;
pub mod intents;
pub mod protocol;

// Re-export commonly used types at crate root
pub use error::{ApiError, RippleError, RippleResult};
pub use event::EventKey;
pub use intents::Intents;
pub use protocol::{
    CloseCode, ConnectionProperties, GatewayFrame, HelloPayload, IdentifyPayload, OpCode,
    ResumePayload,
};
