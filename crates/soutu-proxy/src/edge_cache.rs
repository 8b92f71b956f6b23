//! Edge response cache
//!
//! Final responses are cached under the resource id alone; the token,
//! expiry and signature of the request that populated an entry play no part
//! in the key. Where in the pipeline the cache is consulted is decided by
//! [`EdgeCacheMode`](crate::config::EdgeCacheMode).
//!
//! Entries are bounded by total body bytes. Freshness is checked against the
//! injected clock on every read; moka's own time-to-live only reclaims memory.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use moka::future::Cache;
use tracing::trace;

use crate::clock::SharedClock;
use crate::upstream::UpstreamResponse;

/// Headers never relayed to the client or stored
const STRIPPED_HEADERS: &[&str] = &[
    "set-cookie",
    "set-cookie2",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A response ready to serve and to cache
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Status code
    pub status: StatusCode,
    /// Sanitised headers
    pub headers: HeaderMap,
    /// Body bytes
    pub body: Bytes,
}

impl CachedResponse {
    /// Build the client response from an upstream success
    ///
    /// Drops cookie-setting and hop-by-hop headers and rewrites
    /// `cache-control` to `public, max-age={edge_ttl}`.
    #[must_use]
    pub fn from_upstream(upstream: UpstreamResponse, edge_ttl: Duration) -> Self {
        Self {
            status: upstream.status,
            headers: sanitize_headers(&upstream.headers, edge_ttl),
            body: upstream.body,
        }
    }

    fn weight(&self) -> u32 {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        u32::try_from(self.body.len() + header_bytes).unwrap_or(u32::MAX)
    }
}

/// Copy `headers` without session-identifying and hop-by-hop headers, with
/// `cache-control` set to the edge TTL
#[must_use]
pub fn sanitize_headers(headers: &HeaderMap, edge_ttl: Duration) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len() + 1);
    for (name, value) in headers {
        if is_stripped(name) || *name == header::CACHE_CONTROL {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    let cache_control = format!("public, max-age={}", edge_ttl.as_secs());
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        out.insert(header::CACHE_CONTROL, value);
    }
    out
}

fn is_stripped(name: &HeaderName) -> bool {
    STRIPPED_HEADERS.contains(&name.as_str())
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    inserted_at: u64,
}

/// Shared response cache keyed by resource id
#[derive(Clone)]
pub struct EdgeCache {
    entries: Cache<String, Arc<Entry>>,
    clock: SharedClock,
    ttl: Duration,
}

impl std::fmt::Debug for EdgeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeCache")
            .field("entries", &self.entries.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl EdgeCache {
    /// Create a cache holding at most `max_bytes` of responses, each fresh
    /// for `ttl`
    #[must_use]
    pub fn new(max_bytes: u64, ttl: Duration, clock: SharedClock) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &String, entry: &Arc<Entry>| entry.response.weight())
            .time_to_live(ttl.max(Duration::from_secs(1)))
            .build();
        Self {
            entries,
            clock,
            ttl,
        }
    }

    /// Fresh cached response for `resource_id`
    ///
    /// A stale entry reads as a miss but stays in place; the next insert
    /// replaces it and moka's time-to-live reclaims it otherwise.
    pub async fn get(&self, resource_id: &str) -> Option<CachedResponse> {
        let entry = self.entries.get(resource_id).await?;
        let age = self.clock.now_secs().saturating_sub(entry.inserted_at);
        if age >= self.ttl.as_secs() {
            trace!(resource_id, age, "edge cache entry stale");
            return None;
        }
        Some(entry.response.clone())
    }

    /// Store `response` for `resource_id`, replacing any previous entry
    pub async fn insert(&self, resource_id: &str, response: CachedResponse) {
        let entry = Entry {
            response,
            inserted_at: self.clock.now_secs(),
        };
        self.entries
            .insert(resource_id.to_string(), Arc::new(entry))
            .await;
    }

    /// Drop the entry for `resource_id`
    pub async fn invalidate(&self, resource_id: &str) {
        self.entries.invalidate(resource_id).await;
    }

    /// Edge TTL advertised in `cache-control`
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn upstream(headers: &[(&str, &str)]) -> UpstreamResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        UpstreamResponse {
            status: StatusCode::OK,
            headers: map,
            body: Bytes::from_static(b"jpeg-bytes"),
        }
    }

    #[test]
    fn test_sanitize_strips_cookies_and_rewrites_cache_control() {
        let response = CachedResponse::from_upstream(
            upstream(&[
                ("content-type", "image/jpeg"),
                ("content-length", "10"),
                ("set-cookie", "session=1"),
                ("set-cookie", "other=2"),
                ("Set-Cookie2", "legacy=3"),
                ("connection", "keep-alive"),
                ("cache-control", "private, no-store"),
            ]),
            Duration::from_secs(600),
        );

        let headers = &response.headers;
        assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
        assert_eq!(headers.get("content-length").unwrap(), "10");
        assert!(headers.get("set-cookie").is_none());
        assert!(headers.get("set-cookie2").is_none());
        assert!(headers.get("connection").is_none());
        assert_eq!(
            headers.get_all("cache-control").iter().collect::<Vec<_>>(),
            vec!["public, max-age=600"]
        );
    }

    #[tokio::test]
    async fn test_hit_until_ttl_then_miss() {
        let clock = ManualClock::new(1_000);
        let cache = EdgeCache::new(1024 * 1024, Duration::from_secs(600), Arc::new(clock.clone()));
        let response = CachedResponse::from_upstream(upstream(&[]), cache.ttl());

        assert!(cache.get("img_42").await.is_none());
        cache.insert("img_42", response).await;

        clock.advance(599);
        let hit = cache.get("img_42").await.unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"jpeg-bytes"));

        clock.advance(1);
        assert!(cache.get("img_42").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_entry_is_a_miss_without_eviction() {
        let clock = ManualClock::new(1_000);
        let cache = EdgeCache::new(1024 * 1024, Duration::from_secs(600), Arc::new(clock.clone()));
        cache
            .insert(
                "img_42",
                CachedResponse::from_upstream(upstream(&[]), cache.ttl()),
            )
            .await;

        clock.advance(600);
        assert!(cache.get("img_42").await.is_none());
        assert!(cache.entries.contains_key("img_42"));
    }

    #[tokio::test]
    async fn test_keyed_by_resource_only() {
        let clock = ManualClock::new(1_000);
        let cache = EdgeCache::new(1024 * 1024, Duration::from_secs(600), Arc::new(clock));
        cache
            .insert(
                "img_1",
                CachedResponse::from_upstream(upstream(&[]), Duration::from_secs(600)),
            )
            .await;
        assert!(cache.get("img_1").await.is_some());
        assert!(cache.get("img_2").await.is_none());

        cache.invalidate("img_1").await;
        assert!(cache.get("img_1").await.is_none());
    }
}
