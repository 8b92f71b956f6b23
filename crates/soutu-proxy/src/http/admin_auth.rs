//! Bearer key check for the internal issuance API
//!
//! The configured key is hashed with BLAKE3 once at start-up and only the
//! digest is kept. A presented key is hashed the same way and the two
//! digests are compared with `subtle`, so comparison time does not depend on
//! where the keys differ or on their lengths.

use http::HeaderMap;
use http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

use crate::error::{ProxyError, ProxyResult};

/// Minimum length of the configured admin key
///
/// Keys shorter than this are trivially brute-forceable and rejected.
pub const MIN_API_KEY_LENGTH: usize = 32;

#[inline]
fn hash_api_key(key: &str) -> [u8; 32] {
    blake3::hash(key.as_bytes()).into()
}

/// Digest of the configured admin key
#[derive(Clone)]
pub struct AdminKey {
    digest: [u8; 32],
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminKey(<redacted>)")
    }
}

impl AdminKey {
    /// Hash the configured key
    ///
    /// # Errors
    ///
    /// Configuration error if the key is shorter than [`MIN_API_KEY_LENGTH`].
    pub fn new(key: &str) -> ProxyResult<Self> {
        if key.len() < MIN_API_KEY_LENGTH {
            return Err(ProxyError::configuration_with_key(
                format!("admin key must be at least {MIN_API_KEY_LENGTH} characters"),
                "admin.api_key",
            ));
        }
        Ok(Self {
            digest: hash_api_key(key),
        })
    }

    /// Constant-time check of a presented key
    #[must_use]
    pub fn matches(&self, provided: &str) -> bool {
        // Length is public information, bail before hashing
        if provided.len() < MIN_API_KEY_LENGTH {
            return false;
        }
        hash_api_key(provided).ct_eq(&self.digest).into()
    }

    /// Check the `Authorization: Bearer <key>` header
    #[must_use]
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|key| self.matches(key))
    }
}

/// Extract the credential of an `Authorization: Bearer` header
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
