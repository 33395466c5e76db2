//! Gateway protocol definitions
//!
//! Defines the WebSocket protocol including op codes, frame format, payloads,
//! and close codes.

mod close_codes;
mod frame;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use frame::GatewayFrame;
pub use opcodes::OpCode;
pub use payloads::{ConnectionProperties, HelloPayload, IdentifyPayload, ResumePayload};
