//! # ripple-rest
//!
//! The rate-limited REST layer. Every outbound call is gated by its bucket
//! (a server-assigned per-endpoint concurrency quota) and by a fixed global
//! concurrency ceiling; transient rate-limit responses are retried
//! transparently.

mod client;
mod limiter;
mod request;
mod route;
mod transport;

pub use client::RestClient;
pub use limiter::RateLimiter;
pub use request::{MultipartPart, RestRequest};
pub use route::Route;
pub use transport::{HttpTransport, RestResponse, Transport};

pub use reqwest::Method;
