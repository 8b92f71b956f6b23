//! Upstream byte source
//!
//! The provider-specific download lives behind [`UpstreamFetcher`] so the
//! pipeline can be driven against an in-memory fetcher in tests.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::ProxyResult;

/// Response received from the upstream provider
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Upstream status
    pub status: StatusCode,
    /// Upstream headers, unfiltered
    pub headers: HeaderMap,
    /// Full body
    pub body: Bytes,
}

impl UpstreamResponse {
    /// A `200 OK` with the given body and no headers
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Fetches the bytes behind an upstream path with one GET
#[async_trait]
pub trait UpstreamFetcher: Send + Sync + std::fmt::Debug {
    /// Fetch `path`
    ///
    /// Any status is returned as-is; the caller decides what counts as
    /// success. Implementations must not retry.
    ///
    /// # Errors
    ///
    /// `UpstreamUnavailable` on transport failure or when the body exceeds
    /// the implementation's size limit.
    async fn fetch(&self, path: &str) -> ProxyResult<UpstreamResponse>;
}
