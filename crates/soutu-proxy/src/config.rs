//! Runtime configuration for the proxy core
//!
//! Loading from files and the environment happens in the server crate; this
//! module only holds the resolved values the components are built from.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default path prefix of the delivery endpoint
pub const DEFAULT_PATH_PREFIX: &str = "/search/proxy";

/// Where the edge response cache sits in the delivery pipeline
///
/// The cache is keyed by resource id alone. With [`EdgeCacheMode::Shared`]
/// a cached resource is served to any correctly signed request, even past
/// link and token expiry. [`EdgeCacheMode::AfterAuthorization`] keeps the
/// cache but only consults it once expiry and token binding have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCacheMode {
    /// Lookup right after the signature check; a hit bypasses every later check
    #[default]
    Shared,
    /// Lookup after expiry and token binding; a hit still skips rate limiting
    AfterAuthorization,
    /// Never read or written
    Disabled,
}

/// Proxy core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Public origin that issued URLs start with (no trailing slash)
    pub public_base_url: String,
    /// Path of the delivery endpoint
    pub path_prefix: String,
    /// Lifetime of a signed link and of its access token
    pub link_ttl: Duration,
    /// Requests per window, per dimension
    pub rate_limit: u64,
    /// Fixed window length
    pub rate_window: Duration,
    /// Freshness of edge cache entries
    pub edge_cache_ttl: Duration,
    /// Upper bound on cached body bytes
    pub edge_cache_max_bytes: u64,
    /// Where the edge cache is consulted
    pub edge_cache_mode: EdgeCacheMode,
    /// Lifetime of cached upstream paths
    pub location_ttl: Duration,
    /// Deadline for one upstream resolve + fetch
    pub upstream_timeout: Duration,
    /// Largest upstream body the proxy will relay
    pub max_body_bytes: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:8787".to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            link_ttl: Duration::from_secs(15 * 60),
            rate_limit: 30,
            rate_window: Duration::from_secs(60),
            edge_cache_ttl: Duration::from_secs(10 * 60),
            edge_cache_max_bytes: 64 * 1024 * 1024,
            edge_cache_mode: EdgeCacheMode::Shared,
            location_ttl: Duration::from_secs(6 * 60 * 60),
            upstream_timeout: Duration::from_secs(30),
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Set the public base URL, stripping whitespace and trailing slashes
    #[must_use]
    pub fn with_public_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.public_base_url = normalize_base_url(url.as_ref());
        self
    }

    /// Set the link TTL
    #[must_use]
    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    /// Set the rate limit and window
    #[must_use]
    pub fn with_rate_limit(mut self, limit: u64, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    /// Set the edge cache mode
    #[must_use]
    pub fn with_edge_cache_mode(mut self, mode: EdgeCacheMode) -> Self {
        self.edge_cache_mode = mode;
        self
    }

    /// Set the edge cache TTL
    #[must_use]
    pub fn with_edge_cache_ttl(mut self, ttl: Duration) -> Self {
        self.edge_cache_ttl = ttl;
        self
    }

    /// Set the upstream timeout
    #[must_use]
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Check values that would make the proxy misbehave silently
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending key.
    pub fn validate(&self) -> crate::ProxyResult<()> {
        use crate::ProxyError;

        if url::Url::parse(&self.public_base_url).is_err() {
            return Err(ProxyError::configuration_with_key(
                format!("not an absolute URL: {}", self.public_base_url),
                "server.public_base_url",
            ));
        }
        if !self.path_prefix.starts_with('/') {
            return Err(ProxyError::configuration_with_key(
                "must start with '/'",
                "server.path_prefix",
            ));
        }
        if self.link_ttl.is_zero() {
            return Err(ProxyError::configuration_with_key(
                "must be positive",
                "link.ttl_secs",
            ));
        }
        if self.rate_window.as_secs() == 0 {
            return Err(ProxyError::configuration_with_key(
                "must be at least one second",
                "rate_limit.window_secs",
            ));
        }
        if self.upstream_timeout.is_zero() {
            return Err(ProxyError::configuration_with_key(
                "must be positive",
                "upstream.timeout_secs",
            ));
        }
        Ok(())
    }
}

/// Trim whitespace and trailing slashes from a base URL
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
