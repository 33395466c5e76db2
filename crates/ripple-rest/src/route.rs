//! REST routes
//!
//! A route is an endpoint with its resolved resource ids. The ids matter:
//! rate-limit buckets are scoped per resource, so two channels hitting the
//! same endpoint template must not share a bucket.

use reqwest::Method;

/// An endpoint plus the resource ids that scope its rate-limit bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    method: Method,
    path: String,
    channel_id: Option<u64>,
    guild_id: Option<u64>,
    webhook_id: Option<u64>,
}

impl Route {
    /// Create a route from a method and a path with ids already substituted
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into().trim_start_matches('/').to_string(),
            channel_id: None,
            guild_id: None,
            webhook_id: None,
        }
    }

    /// Shorthand for a GET route
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST route
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Shorthand for a DELETE route
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Shorthand for a PATCH route
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Scope the bucket to a channel
    #[must_use]
    pub fn with_channel(mut self, channel_id: u64) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Scope the bucket to a guild
    #[must_use]
    pub fn with_guild(mut self, guild_id: u64) -> Self {
        self.guild_id = Some(guild_id);
        self
    }

    /// Scope the bucket to a webhook
    #[must_use]
    pub fn with_webhook(mut self, webhook_id: u64) -> Self {
        self.webhook_id = Some(webhook_id);
        self
    }

    /// The HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The endpoint path, without a leading slash
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The rate-limit bucket key for this route
    ///
    /// Requests sharing a key share one concurrency quota.
    #[must_use]
    pub fn bucket(&self) -> String {
        fn id(value: Option<u64>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.to_string())
        }

        format!(
            "{}/{}/{}:{} {}",
            id(self.channel_id),
            id(self.guild_id),
            id(self.webhook_id),
            self.method,
            self.path
        )
    }

    /// The full request URL under an API base
    #[must_use]
    pub fn url(&self, api_base: &str) -> String {
        format!("{}/{}", api_base.trim_end_matches('/'), self.path)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} /{}", self.method, self.path)
    }
}
