//! Telegram collaborator configuration

use std::time::Duration;

use secrecy::SecretString;

/// Public Bot API origin
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API connection settings
#[derive(Clone)]
pub struct TelegramConfig {
    /// API origin, without trailing slash
    pub api_base: String,
    /// Bot token
    pub bot_token: Option<SecretString>,
    /// Answer Bot API calls locally
    pub mock: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Largest file download accepted
    pub max_body_bytes: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("mock", &self.mock)
            .field("timeout", &self.timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: None,
            mock: false,
            timeout: Duration::from_secs(30),
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl TelegramConfig {
    /// Set the API origin
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Self {
        self.api_base = api_base.as_ref().trim().trim_end_matches('/').to_string();
        self
    }

    /// Set the bot token
    #[must_use]
    pub fn with_bot_token(mut self, token: impl Into<String>) -> Self {
        self.bot_token = Some(SecretString::from(token.into()));
        self
    }

    /// Enable or disable mock mode
    #[must_use]
    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the download size limit
    #[must_use]
    pub fn with_max_body_bytes(mut self, max: u64) -> Self {
        self.max_body_bytes = max;
        self
    }
}

/// Interpret a `MOCK_TELEGRAM` style value
///
/// Unset is off; any other value is on unless it is `false` (any case) or `0`.
#[must_use]
pub fn mock_flag_enabled(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !v.eq_ignore_ascii_case("false") && v != "0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_flag() {
        assert!(!mock_flag_enabled(None));
        assert!(!mock_flag_enabled(Some("false")));
        assert!(!mock_flag_enabled(Some("FALSE")));
        assert!(!mock_flag_enabled(Some("0")));
        assert!(mock_flag_enabled(Some("1")));
        assert!(mock_flag_enabled(Some("true")));
        assert!(mock_flag_enabled(Some("")));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = TelegramConfig::default().with_bot_token("123456:SECRET");
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("SECRET"));
    }

    #[test]
    fn test_api_base_normalized() {
        let config = TelegramConfig::default().with_api_base("http://127.0.0.1:9000/ ");
        assert_eq!(config.api_base, "http://127.0.0.1:9000");
    }
}
