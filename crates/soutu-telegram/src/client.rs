//! Bot API client
//!
//! Every method is a JSON `POST` to `{api_base}/bot{token}/{method}`. The
//! answer envelope is `{"ok": bool, "result": .., "description": .., "error_code": ..}`;
//! a non-2xx status or `ok: false` is an error, otherwise `result` is returned.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use soutu_proxy::location::PathResolver;
use soutu_proxy::{ProxyError, ProxyResult};
use tracing::{debug, instrument, trace, warn};

use crate::config::TelegramConfig;
use crate::error::{TelegramError, TelegramResult};
use crate::fetcher::TelegramFileFetcher;

/// Path answered by `getFile` in mock mode
pub const MOCK_FILE_PATH: &str = "mock/file.jpg";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// `File` object returned by `getFile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Identifier the file was requested with
    #[serde(default)]
    pub file_id: String,
    /// Identifier stable across bots
    #[serde(default)]
    pub file_unique_id: Option<String>,
    /// Size in bytes, when known
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Download path below `/file/bot<token>/`; absent when the file is too
    /// large to be downloaded through the Bot API
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: Option<SecretString>,
    mock: bool,
    max_body_bytes: u64,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("http", &"<reqwest::Client>")
            .field("api_base", &self.api_base)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("mock", &self.mock)
            .finish()
    }
}

impl TelegramClient {
    /// Build a client
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no bot token is set outside mock
    /// mode, or when the HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> TelegramResult<Self> {
        let has_token = config
            .bot_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().trim().is_empty());
        if !has_token && !config.mock {
            return Err(TelegramError::Configuration(
                "telegram.bot_token is required unless mock mode is on".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(std::time::Duration::from_secs(90)))
            .build()
            .map_err(|e| {
                TelegramError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        debug!(api_base = %config.api_base, mock = config.mock, "created Telegram client");

        Ok(Self {
            http,
            api_base: config.api_base,
            bot_token: config.bot_token,
            mock: config.mock,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Whether Bot API calls are answered locally
    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// Fetcher for file downloads sharing this client's connection pool
    #[must_use]
    pub fn file_fetcher(&self) -> TelegramFileFetcher {
        TelegramFileFetcher::new(
            self.http.clone(),
            self.api_base.clone(),
            self.bot_token.clone(),
            self.max_body_bytes,
        )
    }

    /// Call a Bot API method and return its `result`
    ///
    /// # Errors
    ///
    /// `Api` for a non-2xx answer or `ok: false`, `Transport` when no answer
    /// arrived, `Decode` for a 2xx answer that is not a valid envelope.
    #[instrument(level = "debug", skip(self, payload))]
    pub async fn call(&self, method: &str, payload: &Value) -> TelegramResult<Value> {
        if self.mock {
            trace!("answering from mock");
            return Ok(mock_result(method, payload));
        }
        let token = self
            .bot_token
            .as_ref()
            .ok_or_else(|| TelegramError::Configuration("no bot token configured".to_string()))?;

        let url = format!("{}/bot{}/{}", self.api_base, token.expose_secret(), method);
        let response = self.http.post(url).json(payload).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let envelope = match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) if status.is_success() => {
                return Err(TelegramError::Decode(format!("{method}: {e}")));
            }
            Err(_) => None,
        };

        match envelope {
            Some(Envelope {
                ok: true,
                result,
                ..
            }) if status.is_success() => Ok(result.unwrap_or(Value::Null)),
            other => {
                let (description, error_code) =
                    other.map_or((None, None), |e| (e.description, e.error_code));
                warn!(
                    status = status.as_u16(),
                    error_code,
                    description = description.as_deref().unwrap_or_default(),
                    "Bot API call failed"
                );
                Err(TelegramError::Api {
                    method: method.to_string(),
                    status: status.as_u16(),
                    description,
                    error_code,
                })
            }
        }
    }

    /// Look up the download path of `file_id`
    ///
    /// # Errors
    ///
    /// Errors of [`TelegramClient::call`], or `Decode` if `result` is not a
    /// `File` object.
    pub async fn get_file(&self, file_id: &str) -> TelegramResult<FileInfo> {
        let result = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let mut info: FileInfo = serde_json::from_value(result)
            .map_err(|e| TelegramError::Decode(format!("getFile: {e}")))?;
        if info.file_id.is_empty() {
            info.file_id = file_id.to_string();
        }
        Ok(info)
    }
}

fn mock_result(method: &str, payload: &Value) -> Value {
    match method {
        "getFile" => json!({
            "file_id": payload.get("file_id").cloned().unwrap_or(Value::Null),
            "file_path": MOCK_FILE_PATH,
        }),
        _ => json!({ "mock": true }),
    }
}

#[async_trait]
impl PathResolver for TelegramClient {
    async fn resolve_path(&self, resource_id: &str) -> ProxyResult<String> {
        match self.get_file(resource_id).await {
            Ok(FileInfo {
                file_path: Some(path),
                ..
            }) if !path.is_empty() => Ok(path),
            Ok(_) => {
                debug!(resource_id, "getFile returned no file_path");
                Err(ProxyError::not_found(resource_id))
            }
            Err(e) if e.is_not_found() => {
                debug!(resource_id, error = %e, "file unknown to the Bot API");
                Err(ProxyError::not_found(resource_id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_token_outside_mock() {
        let err = TelegramClient::new(TelegramConfig::default()).unwrap_err();
        assert!(matches!(err, TelegramError::Configuration(_)));

        let err = TelegramClient::new(TelegramConfig::default().with_bot_token("  ")).unwrap_err();
        assert!(matches!(err, TelegramError::Configuration(_)));

        assert!(TelegramClient::new(TelegramConfig::default().with_mock(true)).is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let client =
            TelegramClient::new(TelegramConfig::default().with_bot_token("42:TOPSECRET")).unwrap();
        assert!(!format!("{client:?}").contains("TOPSECRET"));
    }

    #[tokio::test]
    async fn test_mock_answers() {
        let client = TelegramClient::new(TelegramConfig::default().with_mock(true)).unwrap();
        let file = client.get_file("img_42").await.unwrap();
        assert_eq!(file.file_path.as_deref(), Some(MOCK_FILE_PATH));
        assert_eq!(file.file_id, "img_42");

        let other = client
            .call("sendMessage", &json!({ "chat_id": 1, "text": "hi" }))
            .await
            .unwrap();
        assert_eq!(other, json!({ "mock": true }));

        assert_eq!(client.resolve_path("img_42").await.unwrap(), MOCK_FILE_PATH);
    }

    #[test]
    fn test_file_info_tolerates_missing_fields() {
        let info: FileInfo = serde_json::from_value(json!({ "file_size": 10 })).unwrap();
        assert_eq!(info.file_path, None);
        assert_eq!(info.file_size, Some(10));
    }
}
