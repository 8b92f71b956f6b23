//! Verification and delivery pipeline
//!
//! One request walks a fixed sequence of stages; each stage either rejects
//! with an error whose [`status_code`](crate::ProxyError::status_code) is the
//! client-visible status, or falls through to the next:
//!
//! | # | Stage | Rejects with |
//! |---|-------|--------------|
//! | 1 | [`DeliveryStage::ParamsMissing`] | 404 |
//! | 2 | [`DeliveryStage::SigParamsMissing`] | 403 |
//! | 3 | [`DeliveryStage::SignatureCheck`] | 403 |
//! | 4 | [`DeliveryStage::EdgeCacheLookup`] | hit is served immediately |
//! | 5 | [`DeliveryStage::ExpiryCheck`] | 403 |
//! | 6 | [`DeliveryStage::TokenBinding`] | 403 |
//! | 7 | [`DeliveryStage::RateLimit`] | 429 |
//! | 8 | [`DeliveryStage::UpstreamFetch`] | 404 / 502 |
//! | 9 | [`DeliveryStage::ServePopulate`] | - |
//!
//! With [`EdgeCacheMode::Shared`] a cache hit at stage 4 skips expiry, token
//! binding and rate limiting. [`EdgeCacheMode::AfterAuthorization`] moves the
//! lookup behind stage 6. Nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use crate::clock::SharedClock;
use crate::config::{EdgeCacheMode, ProxyConfig};
use crate::edge_cache::{CachedResponse, EdgeCache};
use crate::error::{ForbiddenReason, ProxyError, ProxyResult};
use crate::location::{LocationCache, PathResolver};
use crate::payload::DeliveryParams;
use crate::rate_limit::{FixedWindowLimiter, RateLimitKey};
use crate::signing::SigningKey;
use crate::store::{KeySpace, SharedStore};
use crate::token::TokenStore;
use crate::upstream::{UpstreamFetcher, UpstreamResponse};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    /// Resource id present
    ParamsMissing,
    /// Expiry and signature present
    SigParamsMissing,
    /// Signature matches the canonical payload
    SignatureCheck,
    /// Edge cache consulted
    EdgeCacheLookup,
    /// Link not expired
    ExpiryCheck,
    /// Token known and bound to this resource
    TokenBinding,
    /// Both rate limit dimensions accept
    RateLimit,
    /// Path resolved and bytes fetched
    UpstreamFetch,
    /// Response sanitised, served and cached
    ServePopulate,
}

impl DeliveryStage {
    /// Stage name as it appears in logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParamsMissing => "params_missing",
            Self::SigParamsMissing => "sig_params_missing",
            Self::SignatureCheck => "signature_check",
            Self::EdgeCacheLookup => "edge_cache_lookup",
            Self::ExpiryCheck => "expiry_check",
            Self::TokenBinding => "token_binding",
            Self::RateLimit => "rate_limit",
            Self::UpstreamFetch => "upstream_fetch",
            Self::ServePopulate => "serve_populate",
        }
    }
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivery request
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Parsed query parameters
    pub params: DeliveryParams,
    /// Client address used for the address rate limit
    pub client_ip: String,
}

impl DeliveryRequest {
    /// Build a request from a raw query string
    pub fn from_query(query: &str, client_ip: impl Into<String>) -> Self {
        Self {
            params: DeliveryParams::from_query(query),
            client_ip: client_ip.into(),
        }
    }
}

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverySource {
    /// Edge cache hit
    Cache,
    /// Fetched from upstream on this request
    Upstream,
}

/// A successful delivery
#[derive(Debug, Clone)]
pub struct Delivered {
    /// Response to send
    pub response: CachedResponse,
    /// Where it came from
    pub source: DeliverySource,
}

/// Collaborators the pipeline is built from
#[derive(Debug, Clone)]
pub struct DeliveryDeps {
    /// Signing key shared with the issuer
    pub key: SigningKey,
    /// Store for tokens, locations and counters
    pub store: SharedStore,
    /// Key namespace inside the store
    pub keys: KeySpace,
    /// Resolves resource ids to upstream paths
    pub resolver: Arc<dyn PathResolver>,
    /// Downloads upstream bytes
    pub fetcher: Arc<dyn UpstreamFetcher>,
    /// Time source
    pub clock: SharedClock,
}

/// The delivery handler
#[derive(Debug, Clone)]
pub struct DeliveryHandler {
    key: SigningKey,
    tokens: TokenStore,
    limiter: FixedWindowLimiter,
    locations: LocationCache,
    fetcher: Arc<dyn UpstreamFetcher>,
    edge: EdgeCache,
    clock: SharedClock,
    mode: EdgeCacheMode,
    rate_limit: u64,
    rate_window: Duration,
    upstream_timeout: Duration,
    max_body_bytes: u64,
}

impl DeliveryHandler {
    /// Wire a handler from configuration and collaborators
    #[must_use]
    pub fn new(config: &ProxyConfig, deps: DeliveryDeps) -> Self {
        let DeliveryDeps {
            key,
            store,
            keys,
            resolver,
            fetcher,
            clock,
        } = deps;
        Self {
            key,
            tokens: TokenStore::new(store.clone(), keys.clone()),
            limiter: FixedWindowLimiter::new(store.clone(), keys.clone(), clock.clone()),
            locations: LocationCache::new(store, keys, resolver, config.location_ttl),
            fetcher,
            edge: EdgeCache::new(
                config.edge_cache_max_bytes,
                config.edge_cache_ttl,
                clock.clone(),
            ),
            clock,
            mode: config.edge_cache_mode,
            rate_limit: config.rate_limit,
            rate_window: config.rate_window,
            upstream_timeout: config.upstream_timeout,
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// The edge cache this handler populates
    #[must_use]
    pub fn edge_cache(&self) -> &EdgeCache {
        &self.edge
    }

    /// Run the pipeline for one request
    ///
    /// # Errors
    ///
    /// The error of the first stage that refused the request.
    #[instrument(
        level = "debug",
        skip_all,
        fields(resource_id = request.params.resource_id.as_deref().unwrap_or(""))
    )]
    pub async fn deliver(&self, request: &DeliveryRequest) -> ProxyResult<Delivered> {
        let params = &request.params;

        let Some(resource_id) = params.resource_id.as_deref() else {
            return Err(self.reject(
                DeliveryStage::ParamsMissing,
                ProxyError::invalid_request("missing resource id"),
            ));
        };

        let (Some(payload), Some(signature)) =
            (params.signed_payload(), params.signature.as_deref())
        else {
            return Err(self.reject(
                DeliveryStage::SigParamsMissing,
                ProxyError::forbidden(ForbiddenReason::MissingSignature),
            ));
        };

        if !self.key.verify(&payload.canonical(), signature) {
            return Err(self.reject(
                DeliveryStage::SignatureCheck,
                ProxyError::forbidden(ForbiddenReason::BadSignature),
            ));
        }

        if self.mode == EdgeCacheMode::Shared {
            if let Some(hit) = self.cached(resource_id).await {
                return Ok(hit);
            }
        }

        let now = self.clock.now_secs();
        if now > payload.expires_at {
            return Err(self.reject(
                DeliveryStage::ExpiryCheck,
                ProxyError::forbidden(ForbiddenReason::Expired),
            ));
        }

        let binding = self
            .tokens
            .get(&payload.token)
            .await
            .map_err(|e| self.reject(DeliveryStage::TokenBinding, e))?
            .ok_or_else(|| {
                self.reject(
                    DeliveryStage::TokenBinding,
                    ProxyError::forbidden(ForbiddenReason::UnknownToken),
                )
            })?;
        if binding.resource_id != resource_id {
            return Err(self.reject(
                DeliveryStage::TokenBinding,
                ProxyError::forbidden(ForbiddenReason::TokenMismatch),
            ));
        }

        if self.mode == EdgeCacheMode::AfterAuthorization {
            if let Some(hit) = self.cached(resource_id).await {
                return Ok(hit);
            }
        }

        // Both dimensions are charged before either decision is acted on
        let by_subject = self
            .limiter
            .allow(
                &RateLimitKey::user(binding.subject_id.as_str()),
                self.rate_limit,
                self.rate_window,
            )
            .await
            .map_err(|e| self.reject(DeliveryStage::RateLimit, e))?;
        let by_address = self
            .limiter
            .allow(
                &RateLimitKey::ip(request.client_ip.as_str()),
                self.rate_limit,
                self.rate_window,
            )
            .await
            .map_err(|e| self.reject(DeliveryStage::RateLimit, e))?;
        by_subject
            .and(by_address)
            .map_err(|info| self.reject(DeliveryStage::RateLimit, ProxyError::RateLimited(info)))?;

        let upstream = tokio::time::timeout(self.upstream_timeout, self.fetch_upstream(resource_id))
            .await
            .map_err(|_| {
                self.reject(
                    DeliveryStage::UpstreamFetch,
                    ProxyError::timeout("upstream fetch", self.upstream_timeout),
                )
            })?
            .map_err(|e| self.reject(DeliveryStage::UpstreamFetch, e))?;

        let response = CachedResponse::from_upstream(upstream, self.edge.ttl());
        if self.mode != EdgeCacheMode::Disabled {
            self.edge.insert(resource_id, response.clone()).await;
        }
        debug!(
            stage = %DeliveryStage::ServePopulate,
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "served from upstream"
        );
        Ok(Delivered {
            response,
            source: DeliverySource::Upstream,
        })
    }

    async fn cached(&self, resource_id: &str) -> Option<Delivered> {
        let response = self.edge.get(resource_id).await?;
        debug!(stage = %DeliveryStage::EdgeCacheLookup, "served from edge cache");
        Some(Delivered {
            response,
            source: DeliverySource::Cache,
        })
    }

    async fn fetch_upstream(&self, resource_id: &str) -> ProxyResult<UpstreamResponse> {
        let path = self.locations.resolve(resource_id, None).await?;
        let upstream = self.fetcher.fetch(&path).await?;

        if !upstream.status.is_success() {
            // A stale path is re-resolved by the next request, not this one
            if let Err(e) = self.locations.invalidate(resource_id).await {
                warn!(
                    stage = %DeliveryStage::UpstreamFetch,
                    error = %e,
                    "failed to invalidate cached location"
                );
            }
            return Err(ProxyError::upstream_with_status(
                format!("upstream answered {}", upstream.status),
                upstream.status.as_u16(),
            ));
        }
        if upstream.body.len() as u64 > self.max_body_bytes {
            return Err(ProxyError::upstream(format!(
                "upstream body of {} bytes exceeds limit of {}",
                upstream.body.len(),
                self.max_body_bytes
            )));
        }
        Ok(upstream)
    }

    fn reject(&self, stage: DeliveryStage, error: ProxyError) -> ProxyError {
        let status = error.status_code().as_u16();
        match &error {
            ProxyError::UpstreamUnavailable { .. } | ProxyError::Timeout { .. } => {
                warn!(stage = %stage, status, error = %error, "delivery rejected");
            }
            e if e.is_internal() => {
                error!(stage = %stage, status, error = %error, "delivery failed");
            }
            _ => {
                debug!(stage = %stage, status, reason = %error, "delivery rejected");
            }
        }
        error
    }
}
