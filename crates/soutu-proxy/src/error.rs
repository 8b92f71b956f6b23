//! Error types for soutu-proxy
//!
//! Every delivery rejection is terminal for the request that produced it:
//! the handler never retries. [`ProxyError::status_code`] is the single
//! place where an error becomes an HTTP status, and [`ProxyError::sanitize`]
//! the single place where it becomes a client-visible body.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::rate_limit::RateLimitInfo;

/// Result type for proxy operations
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// Why a request was refused with 403
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// `exp` or `sig` absent (or `exp` not a positive integer)
    MissingSignature,
    /// Recomputed signature does not match
    BadSignature,
    /// Link expiry has passed
    Expired,
    /// Token absent from the token store
    UnknownToken,
    /// Token bound to a different resource
    TokenMismatch,
}

impl std::fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingSignature => "missing signature parameters",
            Self::BadSignature => "signature mismatch",
            Self::Expired => "link expired",
            Self::UnknownToken => "unknown access token",
            Self::TokenMismatch => "token bound to another resource",
        };
        f.write_str(s)
    }
}

/// Main error type for soutu-proxy
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// A required request field is missing
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was missing
        message: String,
    },

    /// Bad signature, expired link, or unknown/mismatched token
    #[error("Forbidden: {reason}")]
    Forbidden {
        /// Which check refused the request
        reason: ForbiddenReason,
    },

    /// A rate limit dimension refused the request
    #[error("{0}")]
    RateLimited(RateLimitInfo),

    /// The upstream provider could not deliver the bytes
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        /// Failure detail (logged, never sent to the client)
        message: String,
        /// Upstream status, when one was received
        status_code: Option<u16>,
    },

    /// The resource has no upstream mapping
    #[error("Resource not found: {resource_id}")]
    NotFound {
        /// The resource identifier that could not be resolved
        resource_id: String,
    },

    /// Operation exceeded its deadline
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout {
        /// What timed out
        operation: String,
        /// The configured deadline
        timeout_ms: u64,
    },

    /// Backing store failure
    #[error("Storage error: {message}")]
    Storage {
        /// Failure detail
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Failure detail
        message: String,
        /// Offending configuration key
        key: Option<String>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProxyError {
    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(reason: ForbiddenReason) -> Self {
        Self::Forbidden { reason }
    }

    /// Create an upstream error without a status
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create an upstream error carrying the upstream status
    pub fn upstream_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a not-found error
    pub fn not_found(resource_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_id: resource_id.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: None,
        }
    }

    /// Create a configuration error with key context
    pub fn configuration_with_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// HTTP status this error is surfaced as
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable { .. } | Self::Timeout { .. } => StatusCode::BAD_GATEWAY,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Sanitize error message for client responses
    ///
    /// Removes internal details to prevent information disclosure.
    #[must_use]
    pub fn sanitize(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } | Self::NotFound { .. } => "Not Found",
            Self::Forbidden {
                reason: ForbiddenReason::Expired,
            } => "Expired",
            Self::Forbidden { .. } => "Forbidden",
            Self::RateLimited(_) => "Too Many Requests",
            Self::UpstreamUnavailable { .. } | Self::Timeout { .. } => "Upstream error",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Serialization(_) => {
                "Internal Server Error"
            }
        }
    }

    /// Whether this error indicates a fault of the proxy itself rather than
    /// a refused request
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Serialization(_)
        )
    }
}
