//! Error types for soutu-telegram

use soutu_proxy::ProxyError;
use thiserror::Error;

/// Result type for Telegram operations
pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

/// Telegram collaborator errors
///
/// Messages never contain the bot token: transport errors are stripped of
/// their URL before they are wrapped.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelegramError {
    /// The Bot API answered with a non-2xx status or `ok: false`
    #[error("Telegram API {method} failed: {status} {}", .description.as_deref().unwrap_or("no description"))]
    Api {
        /// Bot API method
        method: String,
        /// HTTP status of the answer
        status: u16,
        /// `description` field of the answer
        description: Option<String>,
        /// `error_code` field of the answer
        error_code: Option<i64>,
    },

    /// The request never produced an answer
    #[error("Transport error: {message}")]
    Transport {
        /// Failure detail
        message: String,
        /// Whether the client timeout fired
        timed_out: bool,
    },

    /// The answer could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A file download exceeded the configured size limit
    #[error("Body exceeds {limit} bytes")]
    BodyTooLarge {
        /// The configured limit
        limit: u64,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TelegramError {
    /// Whether the Bot API reported the file as unknown
    ///
    /// `getFile` answers 400 for ids it cannot resolve.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api {
                status,
                error_code,
                ..
            } => *status == 400 || *status == 404 || matches!(error_code, Some(400 | 404)),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        let timed_out = e.is_timeout();
        Self::Transport {
            message: e.without_url().to_string(),
            timed_out,
        }
    }
}

impl From<TelegramError> for ProxyError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::Api { status, .. } => {
                ProxyError::upstream_with_status(e.to_string(), status)
            }
            TelegramError::Configuration(message) => ProxyError::configuration(message),
            TelegramError::Transport { .. }
            | TelegramError::Decode(_)
            | TelegramError::BodyTooLarge { .. } => ProxyError::upstream(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, error_code: Option<i64>) -> TelegramError {
        TelegramError::Api {
            method: "getFile".to_string(),
            status,
            description: Some("Bad Request: invalid file_id".to_string()),
            error_code,
        }
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            api(400, Some(400)).to_string(),
            "Telegram API getFile failed: 400 Bad Request: invalid file_id"
        );
    }

    #[test]
    fn test_not_found_classification() {
        assert!(api(400, Some(400)).is_not_found());
        assert!(api(200, Some(400)).is_not_found());
        assert!(!api(401, Some(401)).is_not_found());
        assert!(!TelegramError::Decode("x".into()).is_not_found());
    }

    #[test]
    fn test_into_proxy_error() {
        let proxy: ProxyError = api(502, None).into();
        assert!(matches!(
            proxy,
            ProxyError::UpstreamUnavailable {
                status_code: Some(502),
                ..
            }
        ));

        let proxy: ProxyError = TelegramError::Configuration("no token".into()).into();
        assert!(proxy.is_internal());

        let proxy: ProxyError = TelegramError::BodyTooLarge { limit: 10 }.into();
        assert_eq!(proxy.sanitize(), "Upstream error");
    }
}
