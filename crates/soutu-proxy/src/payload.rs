//! Canonical signed payload and delivery query parameters
//!
//! The canonical payload is `file_id=<id>&exp=<unix secs>&token=<token>`,
//! form-urlencoded in that fixed field order. The signature covers exactly
//! those bytes; `sig` is appended after them and never signed.

use url::form_urlencoded;

/// Query parameter carrying the resource identifier
pub const PARAM_RESOURCE_ID: &str = "file_id";
/// Query parameter carrying the expiry (Unix seconds)
pub const PARAM_EXPIRY: &str = "exp";
/// Query parameter carrying the opaque access token
pub const PARAM_TOKEN: &str = "token";
/// Query parameter carrying the signature
pub const PARAM_SIGNATURE: &str = "sig";

/// The signed tuple `(resource_id, expires_at, token)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Target resource identifier
    pub resource_id: String,
    /// Link expiry, Unix seconds
    pub expires_at: u64,
    /// Opaque access token
    pub token: String,
}

impl SignedPayload {
    /// Build a payload
    pub fn new(resource_id: impl Into<String>, expires_at: u64, token: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            expires_at,
            token: token.into(),
        }
    }

    /// Serialize to the canonical query string
    #[must_use]
    pub fn canonical(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair(PARAM_RESOURCE_ID, &self.resource_id)
            .append_pair(PARAM_EXPIRY, &self.expires_at.to_string())
            .append_pair(PARAM_TOKEN, &self.token)
            .finish()
    }

    /// Canonical query string followed by `&sig=<signature>`
    #[must_use]
    pub fn query_with_signature(&self, signature: &str) -> String {
        let sig = form_urlencoded::Serializer::new(String::new())
            .append_pair(PARAM_SIGNATURE, signature)
            .finish();
        format!("{}&{}", self.canonical(), sig)
    }
}

/// Parameters of a delivery request as received
///
/// Empty values count as absent. A missing token is kept as the empty string
/// so it still participates in the signature check and then fails binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryParams {
    /// `file_id`
    pub resource_id: Option<String>,
    /// `exp`, when present and a positive integer
    pub expires_at: Option<u64>,
    /// `token`, empty when absent
    pub token: String,
    /// `sig`
    pub signature: Option<String>,
}

impl DeliveryParams {
    /// Parse a raw query string; the first occurrence of each key wins
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut resource_id = None;
        let mut expiry = None;
        let mut token = None;
        let mut signature = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                PARAM_RESOURCE_ID => &mut resource_id,
                PARAM_EXPIRY => &mut expiry,
                PARAM_TOKEN => &mut token,
                PARAM_SIGNATURE => &mut signature,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        Self {
            resource_id: resource_id.filter(|v| !v.is_empty()),
            expires_at: expiry
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|&v| v > 0),
            token: token.unwrap_or_default(),
            signature: signature.filter(|v| !v.is_empty()),
        }
    }

    /// The payload these parameters claim was signed, if complete enough
    #[must_use]
    pub fn signed_payload(&self) -> Option<SignedPayload> {
        Some(SignedPayload::new(
            self.resource_id.clone()?,
            self.expires_at?,
            self.token.clone(),
        ))
    }
}
