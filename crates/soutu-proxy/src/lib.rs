//! # soutu-proxy - Signed Media Delivery Proxy
//!
//! Turns a provider-specific media reference (a Telegram `file_id`) into a
//! public, time-bounded, tamper-proof URL, and serves that URL back while
//! enforcing expiry, per-subject and per-address rate limits, and a shared
//! response cache.
//!
//! ## Architecture
//!
//! ```text
//!  chat command handler                    HTTP client
//!          │ issue(resource, subject)           │ GET /search/proxy?file_id=..&exp=..&token=..&sig=..
//!          ▼                                    ▼
//!   ┌─────────────┐                     ┌──────────────────┐
//!   │  UrlIssuer  │                     │ DeliveryHandler  │
//!   └─────┬───────┘                     └──┬──┬──┬──┬──────┘
//!         │ sign        put                │  │  │  │
//!         ▼              ▼                 │  │  │  ▼
//!   SigningKey      TokenStore ◄───────────┘  │  │  EdgeCache (moka)
//!                        │                    │  ▼
//!                        │         FixedWindowLimiter
//!                        ▼                    │
//!                     KvStore ◄───────────────┘
//!               (memory | redis)   ▲
//!                                  │
//!                           LocationCache ──► PathResolver / UpstreamFetcher
//! ```
//!
//! - [`signing`] - HMAC-SHA256 key, built once and injected
//! - [`payload`] - canonical query string that is signed and re-verified
//! - [`store`] - key-value store with per-entry TTL and atomic conditional increment
//! - [`token`] - opaque access tokens bound to `(resource, subject)`
//! - [`location`] - cached upstream paths, refreshed through a [`location::PathResolver`]
//! - [`rate_limit`] - fixed-window counters keyed by subject
//! - [`edge_cache`] - shared response cache keyed by resource id alone
//! - [`issuer`] - mints signed URLs
//! - [`delivery`] - the verification/delivery pipeline
//! - [`http`] - axum router (feature `http`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod delivery;
pub mod edge_cache;
pub mod error;
pub mod issuer;
pub mod location;
pub mod payload;
pub mod rate_limit;
pub mod search_links;
pub mod signing;
pub mod store;
pub mod token;
pub mod upstream;

#[cfg(feature = "http")]
pub mod http;

pub use error::{ForbiddenReason, ProxyError, ProxyResult};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{EdgeCacheMode, ProxyConfig};
    pub use crate::delivery::{
        Delivered, DeliveryHandler, DeliveryRequest, DeliverySource, DeliveryStage,
    };
    pub use crate::edge_cache::{CachedResponse, EdgeCache};
    pub use crate::error::{ForbiddenReason, ProxyError, ProxyResult};
    pub use crate::issuer::{IssuedLink, UrlIssuer};
    pub use crate::location::{LocationCache, PathResolver};
    pub use crate::payload::{DeliveryParams, SignedPayload};
    pub use crate::rate_limit::{FixedWindowLimiter, RateLimitInfo, RateLimitKey};
    pub use crate::search_links::SearchLinks;
    pub use crate::signing::SigningKey;
    pub use crate::store::{KvStore, MemoryStore, SharedStore};
    pub use crate::token::{AccessToken, TokenBinding, TokenStore};
    pub use crate::upstream::{UpstreamFetcher, UpstreamResponse};
}

/// Version of soutu-proxy
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
