//! File downloads from `{api_base}/file/bot{token}/{path}`

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use secrecy::{ExposeSecret, SecretString};
use soutu_proxy::ProxyResult;
use soutu_proxy::upstream::{UpstreamFetcher, UpstreamResponse};
use tracing::{debug, instrument, warn};

use crate::error::{TelegramError, TelegramResult};

/// Downloads file bytes for the proxy core
///
/// Non-2xx answers are returned as-is with an empty body; the delivery
/// pipeline decides what they mean.
#[derive(Clone)]
pub struct TelegramFileFetcher {
    http: reqwest::Client,
    api_base: String,
    bot_token: Option<SecretString>,
    max_body_bytes: u64,
}

impl std::fmt::Debug for TelegramFileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramFileFetcher")
            .field("api_base", &self.api_base)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl TelegramFileFetcher {
    pub(crate) fn new(
        http: reqwest::Client,
        api_base: String,
        bot_token: Option<SecretString>,
        max_body_bytes: u64,
    ) -> Self {
        Self {
            http,
            api_base,
            bot_token,
            max_body_bytes,
        }
    }

    /// Download `path`, refusing bodies over the size limit
    ///
    /// # Errors
    ///
    /// `Configuration` without a bot token, `Transport` when the download
    /// fails midway, `BodyTooLarge` over the limit.
    #[instrument(level = "debug", skip(self))]
    pub async fn download(&self, path: &str) -> TelegramResult<UpstreamResponse> {
        let token = self.bot_token.as_ref().ok_or_else(|| {
            TelegramError::Configuration("file downloads need a bot token".to_string())
        })?;
        let url = format!(
            "{}/file/bot{}/{}",
            self.api_base,
            token.expose_secret(),
            path.trim_start_matches('/')
        );

        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            warn!(status = status.as_u16(), "file download refused");
            return Ok(UpstreamResponse {
                status,
                headers,
                body: Bytes::new(),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes)
        {
            return Err(TelegramError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(TelegramError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "file downloaded");
        Ok(UpstreamResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}

#[async_trait]
impl UpstreamFetcher for TelegramFileFetcher {
    async fn fetch(&self, path: &str) -> ProxyResult<UpstreamResponse> {
        Ok(self.download(path).await?)
    }
}
