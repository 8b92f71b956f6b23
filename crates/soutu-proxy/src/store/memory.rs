use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use super::KvStore;
use crate::clock::{SharedClock, SystemClock};
use crate::error::ProxyResult;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: u64,
}

impl StoredValue {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// In-process store backed by a `DashMap`
///
/// Expired entries are dropped lazily when read and in bulk by
/// [`MemoryStore::purge_expired`]. Clones share the same map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
    clock: SharedClock,
}

impl MemoryStore {
    /// Create a store on the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on a caller-supplied clock
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.entries.len();
        self.entries.retain(|_, v| v.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            trace!(removed, "purged expired store entries");
        }
        removed
    }

    /// Number of entries, including expired ones not yet purged
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expiry(&self, ttl: Duration) -> u64 {
        self.clock.now_secs().saturating_add(ttl.as_secs().max(1))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> ProxyResult<Option<String>> {
        let now = self.clock.now_secs();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries.remove_if(key, |_, v| !v.is_live(now));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ProxyResult<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: self.expiry(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> ProxyResult<Option<u64>> {
        let now = self.clock.now_secs();
        // The entry guard holds the shard lock for the whole read-compare-write
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                let current = if stored.is_live(now) {
                    stored.value.parse::<u64>().unwrap_or(0)
                } else {
                    stored.expires_at = self.expiry(ttl);
                    0
                };
                if current >= limit {
                    return Ok(None);
                }
                let next = current + 1;
                stored.value = next.to_string();
                Ok(Some(next))
            }
            Entry::Vacant(vacant) => {
                if limit == 0 {
                    return Ok(None);
                }
                vacant.insert(StoredValue {
                    value: "1".to_string(),
                    expires_at: self.expiry(ttl),
                });
                Ok(Some(1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(10_000);
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (store, _) = store();
        store.put("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire_and_are_purged_on_read() {
        let (store, clock) = store();
        store.put("k", "v", Duration::from_secs(60)).await.unwrap();
        clock.advance(59);
        assert!(store.get("k").await.unwrap().is_some());
        clock.advance(1);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store();
        store.put("short", "1", Duration::from_secs(5)).await.unwrap();
        store.put("long", "2", Duration::from_secs(500)).await.unwrap();
        clock.advance(10);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_below_stops_at_limit() {
        let (store, _) = store();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.increment_below("c", 2, ttl).await.unwrap(), Some(1));
        assert_eq!(store.increment_below("c", 2, ttl).await.unwrap(), Some(2));
        assert_eq!(store.increment_below("c", 2, ttl).await.unwrap(), None);
        // A refused increment does not write
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_increment_restarts_after_expiry() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.increment_below("c", 1, ttl).await.unwrap(), Some(1));
        assert_eq!(store.increment_below("c", 1, ttl).await.unwrap(), None);
        clock.advance(60);
        assert_eq!(store.increment_below("c", 1, ttl).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_zero_limit_never_increments() {
        let (store, _) = store();
        let result = store
            .increment_below("c", 0, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_increments_never_exceed_limit() {
        let (store, _) = store();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .increment_below("hot", 10, Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 10);
    }
}
