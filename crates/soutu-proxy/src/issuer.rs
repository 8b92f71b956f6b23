//! Signed URL issuance
//!
//! `issue` is not best-effort: if the token cannot be persisted no URL is
//! returned, since a URL whose token the store never saw can only ever be
//! refused (or, worse, served from the edge cache without a subject).

use std::sync::Arc;
use std::time::Duration;

use ring::rand::SystemRandom;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::clock::SharedClock;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::payload::SignedPayload;
use crate::search_links::SearchLinks;
use crate::signing::SigningKey;
use crate::token::{AccessToken, TokenBinding, TokenStore};

/// A freshly minted delivery link
#[derive(Debug, Clone, Serialize)]
pub struct IssuedLink {
    /// Absolute signed URL
    pub url: String,
    /// Link expiry, Unix seconds
    pub expires_at: u64,
    /// Token embedded in the URL
    #[serde(skip)]
    pub token: AccessToken,
}

impl IssuedLink {
    /// Reverse image search links for this URL
    #[must_use]
    pub fn search_links(&self) -> SearchLinks {
        SearchLinks::for_image(&self.url)
    }
}

/// Mints signed, time-bounded URLs
#[derive(Debug, Clone)]
pub struct UrlIssuer {
    key: SigningKey,
    tokens: TokenStore,
    clock: SharedClock,
    rng: SystemRandom,
    endpoint: String,
    link_ttl: Duration,
}

impl UrlIssuer {
    /// Create an issuer for the delivery endpoint described by `config`
    pub fn new(
        config: &ProxyConfig,
        key: SigningKey,
        tokens: TokenStore,
        clock: SharedClock,
    ) -> Self {
        Self {
            key,
            tokens,
            clock,
            rng: SystemRandom::new(),
            endpoint: format!("{}{}", config.public_base_url, config.path_prefix),
            link_ttl: config.link_ttl,
        }
    }

    /// Issue a URL granting `subject_id` access to `resource_id` until
    /// `now + link_ttl`
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for an empty resource id; store failures propagate.
    #[instrument(level = "debug", skip(self))]
    pub async fn issue(&self, resource_id: &str, subject_id: &str) -> ProxyResult<IssuedLink> {
        if resource_id.is_empty() {
            return Err(ProxyError::invalid_request("resource id is empty"));
        }

        let expires_at = self.clock.now_secs() + self.link_ttl.as_secs();
        let token = AccessToken::generate(&self.rng)?;
        self.tokens
            .put(
                &token,
                &TokenBinding::new(resource_id, subject_id),
                self.link_ttl,
            )
            .await?;

        let payload = SignedPayload::new(resource_id, expires_at, token.as_str());
        let signature = self.key.sign(&payload.canonical());
        let url = format!(
            "{}?{}",
            self.endpoint,
            payload.query_with_signature(&signature)
        );

        debug!(expires_at, token = ?token, "issued delivery link");
        Ok(IssuedLink {
            url,
            expires_at,
            token,
        })
    }

    /// Revoke a previously issued token
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn revoke(&self, token: &str) -> ProxyResult<()> {
        self.tokens.revoke(token).await
    }
}

/// Shared issuer handle
pub type SharedIssuer = Arc<UrlIssuer>;
