//! Upstream path cache
//!
//! Resolving a resource reference to an upstream path costs a provider API
//! call, so successful resolutions are written through to the store under
//! the resource id and, when known, under an alternate id. Concurrent misses
//! for the same resource both resolve and both write; the resolution is
//! idempotent so the last write wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::ProxyResult;
use crate::store::{KeySpace, SharedStore};

/// Resolves a resource reference to an upstream retrieval path
#[async_trait]
pub trait PathResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `resource_id`
    ///
    /// # Errors
    ///
    /// [`ProxyError::NotFound`](crate::ProxyError::NotFound) when the
    /// provider has no mapping; `UpstreamUnavailable` on transport failure.
    async fn resolve_path(&self, resource_id: &str) -> ProxyResult<String>;
}

/// Store-backed cache in front of a [`PathResolver`]
#[derive(Debug, Clone)]
pub struct LocationCache {
    store: SharedStore,
    keys: KeySpace,
    resolver: Arc<dyn PathResolver>,
    ttl: Duration,
}

impl LocationCache {
    /// Create a location cache
    pub fn new(
        store: SharedStore,
        keys: KeySpace,
        resolver: Arc<dyn PathResolver>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            resolver,
            ttl,
        }
    }

    /// Upstream path for `resource_id`
    ///
    /// Looks up the primary key, then the alternate key, then asks the
    /// resolver and writes the answer back under both.
    ///
    /// # Errors
    ///
    /// Resolver errors (including `NotFound`) and store failures propagate.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, resource_id: &str, alt_id: Option<&str>) -> ProxyResult<String> {
        let primary = self.keys.location(resource_id);
        if let Some(path) = self.store.get(&primary).await? {
            debug!("location cache hit");
            return Ok(path);
        }

        let alt_key = alt_id
            .filter(|alt| !alt.is_empty())
            .map(|alt| self.keys.location_alt(alt));
        if let Some(key) = &alt_key {
            if let Some(path) = self.store.get(key).await? {
                debug!("location cache hit on alternate id");
                self.store.put(&primary, &path, self.ttl).await?;
                return Ok(path);
            }
        }

        let path = self.resolver.resolve_path(resource_id).await?;
        debug!("resolved upstream path");
        self.store.put(&primary, &path, self.ttl).await?;
        if let Some(key) = &alt_key {
            self.store.put(key, &path, self.ttl).await?;
        }
        Ok(path)
    }

    /// Drop the cached path for `resource_id` so the next request resolves
    /// again
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn invalidate(&self, resource_id: &str) -> ProxyResult<()> {
        self.store.delete(&self.keys.location(resource_id)).await
    }
}
