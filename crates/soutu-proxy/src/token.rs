//! Opaque access tokens
//!
//! A token is 16 random bytes, base64url without padding. The store maps it
//! to the `(resource, subject)` pair it was issued for; the entry lives for
//! the link TTL. A token that is absent, expired, or whose stored value no
//! longer parses reads as unknown.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ProxyError, ProxyResult};
use crate::store::{KeySpace, SharedStore};

const TOKEN_BYTES: usize = 16;

/// Opaque, unguessable access token
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    /// Generate a fresh token from the system CSPRNG
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the system RNG is unavailable.
    pub fn generate(rng: &SystemRandom) -> ProxyResult<Self> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.fill(&mut bytes)
            .map_err(|_| ProxyError::configuration("system random source unavailable"))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Token text as carried in URLs
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AccessToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Prefix only; enough to correlate log lines
        let shown: String = self.0.chars().take(8).collect();
        write!(f, "AccessToken({shown}..)")
    }
}

/// What a token was issued for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    /// Resource the token grants access to
    pub resource_id: String,
    /// Subject the link was issued to
    pub subject_id: String,
}

impl TokenBinding {
    /// Build a binding
    pub fn new(resource_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            subject_id: subject_id.into(),
        }
    }
}

/// Token records on top of the key-value store
#[derive(Debug, Clone)]
pub struct TokenStore {
    store: SharedStore,
    keys: KeySpace,
}

impl TokenStore {
    /// Create a token store
    pub fn new(store: SharedStore, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Record `binding` under `token` for `ttl`
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn put(
        &self,
        token: &AccessToken,
        binding: &TokenBinding,
        ttl: Duration,
    ) -> ProxyResult<()> {
        let value = serde_json::to_string(binding)?;
        self.store
            .put(&self.keys.token(token.as_str()), &value, ttl)
            .await
    }

    /// Look up the binding of `token`
    ///
    /// # Errors
    ///
    /// Propagates store failures. An unparsable record is not an error; it
    /// reads as `None`.
    pub async fn get(&self, token: &str) -> ProxyResult<Option<TokenBinding>> {
        if token.is_empty() {
            return Ok(None);
        }
        let Some(raw) = self.store.get(&self.keys.token(token)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<TokenBinding>(&raw) {
            Ok(binding) => Ok(Some(binding)),
            Err(e) => {
                warn!(error = %e, "discarding unparsable token record");
                Ok(None)
            }
        }
    }

    /// Forget `token`; links carrying it stop authorizing
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn revoke(&self, token: &str) -> ProxyResult<()> {
        self.store.delete(&self.keys.token(token)).await
    }
}
