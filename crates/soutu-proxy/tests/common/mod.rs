//! Shared fixtures for soutu-proxy integration tests
//!
//! A [`Harness`] wires the issuer and the delivery handler to one in-memory
//! store, a manual clock and a fake upstream that counts its calls. The store
//! is reached through a [`FaultyStore`] so tests can break it mid-scenario.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use soutu_proxy::delivery::DeliveryDeps;
use soutu_proxy::prelude::*;
use soutu_proxy::store::{KeySpace, KvStore};

pub const SECRET: &[u8] = b"integration-test-secret";
pub const START: u64 = 1_700_000_000;
pub const BODY: &[u8] = b"\xff\xd8\xff\xe0fake-jpeg";

/// Upstream fake: resolves every id except `missing`, serves [`BODY`]
#[derive(Debug, Default)]
pub struct FakeUpstream {
    pub resolves: AtomicUsize,
    pub fetches: AtomicUsize,
    pub fail_status: std::sync::Mutex<Option<StatusCode>>,
    pub delay: std::sync::Mutex<Option<Duration>>,
}

impl FakeUpstream {
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, status: StatusCode) {
        *self.fail_status.lock().unwrap() = Some(status);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl PathResolver for FakeUpstream {
    async fn resolve_path(&self, resource_id: &str) -> ProxyResult<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if resource_id == "missing" {
            return Err(ProxyError::not_found(resource_id));
        }
        Ok(format!("photos/{resource_id}.jpg"))
    }
}

#[async_trait]
impl UpstreamFetcher for FakeUpstream {
    async fn fetch(&self, path: &str) -> ProxyResult<UpstreamResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fail = *self.fail_status.lock().unwrap();
        if let Some(status) = fail {
            return Ok(UpstreamResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("image/jpeg"));
        headers.insert("set-cookie", HeaderValue::from_static("tracking=1"));
        headers.insert("cache-control", HeaderValue::from_static("private"));
        headers.insert("x-upstream-path", HeaderValue::from_str(path).unwrap());
        Ok(UpstreamResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(BODY),
        })
    }
}

/// Memory store whose operations can be made to fail
#[derive(Debug)]
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    failing_reads: std::sync::Mutex<Option<&'static str>>,
    failing_increments: AtomicBool,
    failing_deletes: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing_reads: std::sync::Mutex::new(None),
            failing_increments: AtomicBool::new(false),
            failing_deletes: AtomicBool::new(false),
        }
    }

    /// Fail every `get` whose key contains `fragment`
    pub fn fail_reads(&self, fragment: &'static str) {
        *self.failing_reads.lock().unwrap() = Some(fragment);
    }

    pub fn fail_increments(&self) {
        self.failing_increments.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.failing_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &str) -> ProxyResult<Option<String>> {
        let fragment = *self.failing_reads.lock().unwrap();
        if fragment.is_some_and(|f| key.contains(f)) {
            return Err(ProxyError::storage("connection reset"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> ProxyResult<()> {
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(ProxyError::storage("connection reset"));
        }
        self.inner.delete(key).await
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> ProxyResult<Option<u64>> {
        if self.failing_increments.load(Ordering::SeqCst) {
            return Err(ProxyError::storage("connection reset"));
        }
        self.inner.increment_below(key, limit, ttl).await
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<MemoryStore>,
    pub faults: Arc<FaultyStore>,
    pub upstream: Arc<FakeUpstream>,
    pub issuer: Arc<UrlIssuer>,
    pub handler: Arc<DeliveryHandler>,
    pub config: ProxyConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProxyConfig::default().with_public_base_url("https://img.example.com"))
    }

    pub fn with_config(config: ProxyConfig) -> Self {
        let clock = ManualClock::new(START);
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryStore::with_clock(shared_clock.clone()));
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let upstream = Arc::new(FakeUpstream::default());
        let key = SigningKey::from_secret(SECRET).unwrap();
        let keys = KeySpace::new("test");

        let issuer = UrlIssuer::new(
            &config,
            key.clone(),
            TokenStore::new(faults.clone(), keys.clone()),
            shared_clock.clone(),
        );
        let handler = DeliveryHandler::new(
            &config,
            DeliveryDeps {
                key,
                store: faults.clone(),
                keys,
                resolver: upstream.clone(),
                fetcher: upstream.clone(),
                clock: shared_clock,
            },
        );

        Self {
            clock,
            store,
            faults,
            upstream,
            issuer: Arc::new(issuer),
            handler: Arc::new(handler),
            config,
        }
    }

    pub async fn issue(&self, resource_id: &str, subject_id: &str) -> IssuedLink {
        self.issuer.issue(resource_id, subject_id).await.unwrap()
    }

    /// Deliver the query part of `url` as if sent from `client_ip`
    pub async fn get(&self, url: &str, client_ip: &str) -> ProxyResult<Delivered> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        self.handler
            .deliver(&DeliveryRequest::from_query(query, client_ip))
            .await
    }
}

/// Replace the value of one query parameter without re-signing
pub fn with_param(url: &str, name: &str, value: &str) -> String {
    let (base, query) = url.split_once('?').unwrap();
    let rewritten: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if k == name => format!("{k}={value}"),
            _ => pair.to_string(),
        })
        .collect();
    format!("{base}?{}", rewritten.join("&"))
}

/// Drop one query parameter
pub fn without_param(url: &str, name: &str) -> String {
    let (base, query) = url.split_once('?').unwrap();
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| pair.split_once('=').map(|(k, _)| k) != Some(name))
        .collect();
    format!("{base}?{}", kept.join("&"))
}
