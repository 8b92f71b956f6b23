//! Layered configuration
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. an optional TOML, YAML or JSON file
//! 3. `SOUTU_*` environment variables, `__` between nesting levels
//!    (`SOUTU_LINK__TTL_SECS=900`)
//! 4. the legacy names `TG_PROXY_SECRET`, `BOT_TOKEN` and `MOCK_TELEGRAM`

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use soutu_proxy::config::{DEFAULT_PATH_PREFIX, EdgeCacheMode, ProxyConfig, normalize_base_url};
use soutu_proxy::http::AdminKey;
use soutu_proxy::signing::SigningKey;
use soutu_proxy::store::KeySpace;
use soutu_proxy::ProxyError;
use soutu_telegram::{DEFAULT_API_BASE, TelegramConfig, mock_flag_enabled};

/// Prefix of structured environment variables
pub const ENV_PREFIX: &str = "SOUTU";

const REDACTED: &str = "<redacted>";

// Secrets never serialize; check-config output shows the placeholder
fn serialize_redacted<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match secret {
        Some(_) => serializer.serialize_some(REDACTED),
        None => serializer.serialize_none(),
    }
}

fn exposed(secret: Option<&SecretString>) -> Option<&str> {
    secret
        .map(|s| s.expose_secret().trim())
        .filter(|s| !s.is_empty())
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Sources could not be merged or deserialized
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Values parsed but do not describe a runnable proxy
    #[error(transparent)]
    Invalid(#[from] ProxyError),
}

/// Where tokens, locations and counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process map; single instance only
    #[default]
    Memory,
    /// Redis server shared by every instance
    Redis,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Listener and public addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on
    pub bind: String,
    /// Origin issued URLs start with
    pub public_base_url: String,
    /// Path of the delivery endpoint
    pub path_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            public_base_url: "http://127.0.0.1:8787".to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
        }
    }
}

/// Signing secrets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Primary secret
    #[serde(serialize_with = "serialize_redacted")]
    pub secret: Option<SecretString>,
    /// Used when the primary is unset or blank
    #[serde(serialize_with = "serialize_redacted")]
    pub fallback_secret: Option<SecretString>,
}

/// Link lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Seconds a link and its token stay valid
    pub ttl_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

/// Fixed-window rate limit, applied per dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests per window
    pub limit: u64,
    /// Window length
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 30,
            window_secs: 60,
        }
    }
}

/// Edge response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeCacheSettings {
    /// Freshness of an entry
    pub ttl_secs: u64,
    /// Upper bound on cached body bytes
    pub max_bytes: u64,
    /// Pipeline position
    pub mode: EdgeCacheMode,
}

impl Default for EdgeCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            max_bytes: 64 * 1024 * 1024,
            mode: EdgeCacheMode::Shared,
        }
    }
}

/// Cached upstream paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationCacheSettings {
    /// Seconds a resolved path is reused
    pub ttl_secs: u64,
}

impl Default for LocationCacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 21_600 }
    }
}

/// Upstream fetch limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Deadline for one resolve + fetch
    pub timeout_secs: u64,
    /// Largest body relayed
    pub max_body_bytes: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Backing store
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Which store
    pub backend: StoreBackend,
    /// Connection URL for the Redis backend
    pub redis_url: Option<String>,
    /// Namespace of every key
    pub key_prefix: String,
    /// Sweep interval of the memory backend
    pub purge_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
            key_prefix: "soutu".to_string(),
            purge_interval_secs: 60,
        }
    }
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Redis URLs may carry a password
        f.debug_struct("StoreSettings")
            .field("backend", &self.backend)
            .field("redis_url", &self.redis_url.as_ref().map(|_| REDACTED))
            .field("key_prefix", &self.key_prefix)
            .field("purge_interval_secs", &self.purge_interval_secs)
            .finish()
    }
}

/// Bot API access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// API origin
    pub api_base: String,
    /// Bot token
    #[serde(serialize_with = "serialize_redacted")]
    pub bot_token: Option<SecretString>,
    /// Answer Bot API calls locally
    pub mock: bool,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: None,
            mock: false,
        }
    }
}

/// Internal issuance API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Bearer key; the API is not mounted without one
    #[serde(serialize_with = "serialize_redacted")]
    pub api_key: Option<SecretString>,
}

/// Log level and format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener and public addressing
    pub server: ServerSettings,
    /// Signing secrets
    pub signing: SigningSettings,
    /// Link lifetime
    pub link: LinkSettings,
    /// Rate limit
    pub rate_limit: RateLimitSettings,
    /// Edge cache
    pub edge_cache: EdgeCacheSettings,
    /// Location cache
    pub location_cache: LocationCacheSettings,
    /// Upstream limits
    pub upstream: UpstreamSettings,
    /// Backing store
    pub store: StoreSettings,
    /// Bot API access
    pub telegram: TelegramSettings,
    /// Internal API
    pub admin: AdminSettings,
    /// Logging
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from `path` (if any) and the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unparsable, or if a value
    /// has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_from(path, std::env::vars().collect())
    }

    /// Load from `path` (if any) and an explicit environment map
    ///
    /// # Errors
    ///
    /// See [`Settings::load`].
    pub fn load_from(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(SettingsError::FileNotFound(path.to_path_buf()));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(SettingsError::UnsupportedFormat),
            };
            let name = path.to_str().ok_or(SettingsError::UnsupportedFormat)?;
            builder = builder.add_source(File::new(name, format));
        }

        let legacy = |name: &str| {
            env.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let tg_proxy_secret = legacy("TG_PROXY_SECRET");
        let bot_token = legacy("BOT_TOKEN");
        let mock = env
            .get("MOCK_TELEGRAM")
            .map(|v| mock_flag_enabled(Some(v)));

        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone().into_iter().collect())),
            )
            .set_override_option("signing.secret", tg_proxy_secret)?
            .set_override_option("signing.fallback_secret", bot_token.clone())?
            .set_override_option("telegram.bot_token", bot_token)?
            .set_override_option("telegram.mock", mock)?;

        let mut settings: Self = builder.build()?.try_deserialize()?;
        settings.server.public_base_url = normalize_base_url(&settings.server.public_base_url);
        Ok(settings)
    }

    /// Check everything the server needs before it binds
    ///
    /// # Errors
    ///
    /// Returns the first problem found, naming the configuration key.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.proxy_config().validate()?;
        self.signing_key()?;
        self.admin_key()?;

        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ProxyError::configuration_with_key(
                format!("not a socket address: {}", self.server.bind),
                "server.bind",
            )
            .into());
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(ProxyError::configuration_with_key(
                "required for the redis backend",
                "store.redis_url",
            )
            .into());
        }
        let has_token = exposed(self.telegram.bot_token.as_ref()).is_some();
        if !has_token && !self.telegram.mock {
            return Err(ProxyError::configuration_with_key(
                "required unless telegram.mock is on (or set BOT_TOKEN)",
                "telegram.bot_token",
            )
            .into());
        }
        if self.store.key_prefix.is_empty() {
            return Err(
                ProxyError::configuration_with_key("must not be empty", "store.key_prefix").into(),
            );
        }
        Ok(())
    }

    /// Proxy core configuration
    #[must_use]
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            public_base_url: normalize_base_url(&self.server.public_base_url),
            path_prefix: self.server.path_prefix.clone(),
            link_ttl: Duration::from_secs(self.link.ttl_secs),
            rate_limit: self.rate_limit.limit,
            rate_window: Duration::from_secs(self.rate_limit.window_secs),
            edge_cache_ttl: Duration::from_secs(self.edge_cache.ttl_secs),
            edge_cache_max_bytes: self.edge_cache.max_bytes,
            edge_cache_mode: self.edge_cache.mode,
            location_ttl: Duration::from_secs(self.location_cache.ttl_secs),
            upstream_timeout: Duration::from_secs(self.upstream.timeout_secs),
            max_body_bytes: self.upstream.max_body_bytes,
        }
    }

    /// Signing key from the primary secret, else the fallback
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither secret is set.
    pub fn signing_key(&self) -> Result<SigningKey, ProxyError> {
        SigningKey::from_secrets(
            self.signing.secret.as_ref(),
            self.signing.fallback_secret.as_ref(),
        )
    }

    /// Admin key guarding the internal API, if configured
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a key shorter than the minimum.
    pub fn admin_key(&self) -> Result<Option<AdminKey>, ProxyError> {
        exposed(self.admin.api_key.as_ref())
            .map(AdminKey::new)
            .transpose()
    }

    /// Bot API client configuration
    #[must_use]
    pub fn telegram_config(&self) -> TelegramConfig {
        let mut config = TelegramConfig::default()
            .with_api_base(&self.telegram.api_base)
            .with_mock(self.telegram.mock)
            .with_timeout(Duration::from_secs(self.upstream.timeout_secs))
            .with_max_body_bytes(self.upstream.max_body_bytes);
        if let Some(token) = exposed(self.telegram.bot_token.as_ref()) {
            config = config.with_bot_token(token);
        }
        config
    }

    /// Key namespace inside the store
    #[must_use]
    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.store.key_prefix.clone())
    }

    /// Copy safe to display
    ///
    /// Secrets already serialize as a placeholder; this also masks the Redis
    /// URL, which may carry a password.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.store.redis_url = self.store.redis_url.as_ref().map(|_| REDACTED.to_string());
        copy
    }
}
