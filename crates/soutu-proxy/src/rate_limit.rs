//! Fixed-window rate limiting for the delivery endpoint
//!
//! Counters live in the shared store under
//! `rate:{kind}:{value}:{bucket}` where `bucket = floor(now / window)`.
//! Windows are wall-clock aligned and do not slide: a counter starts at zero
//! at every bucket boundary and expires with its window.
//!
//! ## Usage
//!
//! ```rust
//! use soutu_proxy::prelude::*;
//! use soutu_proxy::store::KeySpace;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> ProxyResult<()> {
//! let clock = Arc::new(SystemClock);
//! let store = Arc::new(MemoryStore::with_clock(clock.clone()));
//! let limiter = FixedWindowLimiter::new(store, KeySpace::default(), clock);
//!
//! let key = RateLimitKey::ip("192.168.1.1");
//! match limiter.allow(&key, 30, Duration::from_secs(60)).await? {
//!     Ok(()) => { /* proceed */ }
//!     Err(info) => println!("retry after {}s", info.retry_after.as_secs()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The increment is the store's atomic conditional increment: a rejected
//! request never bumps the counter, and concurrent requests cannot push the
//! count past the limit.

use std::time::Duration;

use tracing::debug;

use crate::clock::SharedClock;
use crate::error::ProxyResult;
use crate::store::{KeySpace, SharedStore};

/// Identity used for unauthenticated subjects
pub const ANONYMOUS_SUBJECT: &str = "anon";

/// Key for rate limiting (address or requester identity)
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RateLimitKey {
    /// Key type (`ip`, `user`)
    pub key_type: &'static str,
    /// Key value
    pub value: String,
}

impl RateLimitKey {
    /// Create a key based on the client address
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            key_type: "ip",
            value: ip.into(),
        }
    }

    /// Create a key based on the requester identity; empty maps to `anon`
    pub fn user(user_id: impl Into<String>) -> Self {
        let value = user_id.into();
        Self {
            key_type: "user",
            value: if value.is_empty() {
                ANONYMOUS_SUBJECT.to_string()
            } else {
                value
            },
        }
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.key_type, self.value)
    }
}

/// Information about a rate limit violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Time until the current window ends
    pub retry_after: Duration,
    /// Request count in the current window
    pub current_count: u64,
    /// Maximum allowed requests
    pub limit: u64,
    /// Window length
    pub window: Duration,
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limited: {}/{} requests in {:?}, retry after {:?}",
            self.current_count, self.limit, self.window, self.retry_after
        )
    }
}

impl std::error::Error for RateLimitInfo {}

/// Window bucket containing `now`
#[must_use]
pub fn window_bucket(now: u64, window: Duration) -> u64 {
    now / window.as_secs().max(1)
}

/// Seconds from `now` to the end of its window, at least one
#[must_use]
pub fn seconds_until_reset(now: u64, window: Duration) -> u64 {
    let window = window.as_secs().max(1);
    let next = (window_bucket(now, Duration::from_secs(window)) + 1) * window;
    next.saturating_sub(now).max(1)
}

/// Store-backed fixed-window limiter
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    store: SharedStore,
    keys: KeySpace,
    clock: SharedClock,
}

impl FixedWindowLimiter {
    /// Create a limiter
    pub fn new(store: SharedStore, keys: KeySpace, clock: SharedClock) -> Self {
        Self { store, keys, clock }
    }

    /// Count one request for `key` against `limit` per `window`
    ///
    /// The outer result carries store failures; the inner one is the
    /// decision. When the window already holds `limit` requests the request
    /// is rejected and nothing is counted.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn allow(
        &self,
        key: &RateLimitKey,
        limit: u64,
        window: Duration,
    ) -> ProxyResult<Result<(), RateLimitInfo>> {
        let now = self.clock.now_secs();
        let bucket = window_bucket(now, window);
        let counter = self.keys.rate(key.key_type, &key.value, bucket);

        match self.store.increment_below(&counter, limit, window).await? {
            Some(_) => Ok(Ok(())),
            None => {
                debug!(key = %key, limit, "rate limit reached");
                Ok(Err(RateLimitInfo {
                    retry_after: Duration::from_secs(seconds_until_reset(now, window)),
                    current_count: limit,
                    limit,
                    window,
                }))
            }
        }
    }
}
