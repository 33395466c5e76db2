//! Client configuration structs
//!
//! Loads configuration from environment variables with serde-style defaults.

use ripple_core::Intents;
use serde::Deserialize;
use std::env;
use std::fmt;

/// Main client configuration
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Authentication token
    pub token: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub rest: RestConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gateway: GatewayConfig::default(),
            rest: RestConfig::default(),
        }
    }

    /// Set the intents used for Identify
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.gateway.intents = intents;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads a `.env` file if one is present. Only `RIPPLE_TOKEN` is
    /// required; everything else has defaults.
    ///
    /// # Errors
    /// Returns an error if `RIPPLE_TOKEN` is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            token: env::var("RIPPLE_TOKEN").map_err(|_| ConfigError::MissingVar("RIPPLE_TOKEN"))?,
            gateway: GatewayConfig {
                url: env::var("RIPPLE_GATEWAY_URL").unwrap_or_else(|_| default_gateway_url()),
                intents: env::var("RIPPLE_INTENTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map_or_else(Intents::default, Intents::from_bits_truncate),
                heartbeat_jitter: env::var("RIPPLE_HEARTBEAT_JITTER")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
                max_reconnect_attempts: env::var("RIPPLE_MAX_RECONNECT_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_max_reconnect_attempts),
                max_invalid_sessions: env::var("RIPPLE_MAX_INVALID_SESSIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_max_invalid_sessions),
            },
            rest: RestConfig {
                api_base: env::var("RIPPLE_API_BASE").unwrap_or_else(|_| default_api_base()),
                global_concurrency: env::var("RIPPLE_GLOBAL_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_global_concurrency),
                user_agent: env::var("RIPPLE_USER_AGENT").unwrap_or_else(|_| default_user_agent()),
            },
        })
    }
}

// The token must never leak through logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("gateway", &self.gateway)
            .field("rest", &self.rest)
            .finish()
    }
}

/// Gateway connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket URL used when the REST probe is unavailable
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Capability flags sent with Identify
    #[serde(default)]
    pub intents: Intents,

    /// Jitter the first heartbeat by a random fraction of the interval
    #[serde(default = "default_true")]
    pub heartbeat_jitter: bool,

    /// Consecutive failed connection attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Consecutive invalid sessions before the session is reported dead
    #[serde(default = "default_max_invalid_sessions")]
    pub max_invalid_sessions: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            intents: Intents::default(),
            heartbeat_jitter: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            max_invalid_sessions: default_max_invalid_sessions(),
        }
    }
}

/// REST layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    /// Base URL for REST requests
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Fixed ceiling on concurrent outbound requests across all buckets
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: u32,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            global_concurrency: default_global_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

// Default value functions
fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_global_concurrency() -> u32 {
    50
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_max_invalid_sessions() -> u32 {
    3
}

fn default_user_agent() -> String {
    format!("ripple/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
