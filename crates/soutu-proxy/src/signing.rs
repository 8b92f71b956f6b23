//! HMAC-SHA256 signing key
//!
//! One key is derived from the configured secret at start-up and shared by
//! the issuer and the delivery handler for the life of the process. There is
//! no global: whoever builds the service passes the key in.
//!
//! Signatures are base64url without padding. Verification recomputes the
//! signature over the exact payload bytes and compares in constant time.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::error::{ProxyError, ProxyResult};

/// Process-wide signing key
#[derive(Clone)]
pub struct SigningKey {
    key: Arc<hmac::Key>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &"HMAC-SHA256")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SigningKey {
    /// Derive the key from raw secret bytes
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is empty.
    pub fn from_secret(secret: &[u8]) -> ProxyResult<Self> {
        if secret.is_empty() {
            return Err(ProxyError::configuration_with_key(
                "signing secret is empty",
                "signing.secret",
            ));
        }
        Ok(Self {
            key: Arc::new(hmac::Key::new(hmac::HMAC_SHA256, secret)),
        })
    }

    /// Derive the key from the primary secret, falling back to the secondary
    ///
    /// A blank primary (only whitespace) counts as absent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither secret is set.
    pub fn from_secrets(
        primary: Option<&SecretString>,
        fallback: Option<&SecretString>,
    ) -> ProxyResult<Self> {
        let chosen = [primary, fallback]
            .into_iter()
            .flatten()
            .find(|s| !s.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                ProxyError::configuration_with_key(
                    "no signing secret configured (set TG_PROXY_SECRET or BOT_TOKEN)",
                    "signing.secret",
                )
            })?;
        Self::from_secret(chosen.expose_secret().as_bytes())
    }

    /// Sign `payload`, returning the base64url signature
    #[must_use]
    pub fn sign(&self, payload: &str) -> String {
        let tag = hmac::sign(&self.key, payload.as_bytes());
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    }

    /// Check `signature` against `payload`
    #[must_use]
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        let expected = self.sign(payload);
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }
}
