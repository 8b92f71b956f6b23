//! Key-value store with per-entry TTL
//!
//! Tokens, cached upstream paths and rate counters all live here. Handler
//! instances share nothing in-process; when more than one instance serves
//! traffic the store must be the shared backend ([`redis`], feature
//! `redis`). [`MemoryStore`] is the single-instance and test backend.
//!
//! Writes are last-write-wins. The only read-modify-write operation,
//! [`KvStore::increment_below`], is atomic in every backend.

mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProxyResult;

/// Storage backend for tokens, paths and counters
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    /// Read a live value; expired entries read as absent
    async fn get(&self, key: &str) -> ProxyResult<Option<String>>;

    /// Write `value` under `key`, expiring after `ttl`
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ProxyResult<()>;

    /// Remove `key` if present
    async fn delete(&self, key: &str) -> ProxyResult<()>;

    /// Atomically increment a counter unless it already reached `limit`
    ///
    /// Returns `Ok(None)` without writing when the current count is
    /// `>= limit`, otherwise the new count. `ttl` applies when the counter is
    /// created; later increments keep the original expiry.
    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> ProxyResult<Option<u64>>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn KvStore>;

/// Builds namespaced store keys
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Create a key space under `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `{prefix}:token:{token}`
    #[must_use]
    pub fn token(&self, token: &str) -> String {
        format!("{}:token:{}", self.prefix, token)
    }

    /// `{prefix}:loc:file:{resource_id}`
    #[must_use]
    pub fn location(&self, resource_id: &str) -> String {
        format!("{}:loc:file:{}", self.prefix, resource_id)
    }

    /// `{prefix}:loc:alt:{alt_id}`
    #[must_use]
    pub fn location_alt(&self, alt_id: &str) -> String {
        format!("{}:loc:alt:{}", self.prefix, alt_id)
    }

    /// `{prefix}:rate:{kind}:{value}:{bucket}`
    #[must_use]
    pub fn rate(&self, kind: &str, value: &str, bucket: u64) -> String {
        format!("{}:rate:{}:{}:{}", self.prefix, kind, value, bucket)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("soutu")
    }
}
