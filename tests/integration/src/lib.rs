//! Integration test utilities for the ripple client
//!
//! This crate provides an in-process mock gateway (scripted websocket
//! server) and a mock REST API (axum) for end-to-end tests.

pub mod helpers;

pub use helpers::*;
