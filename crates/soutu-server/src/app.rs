//! Composition root
//!
//! Builds the store, the signing key and the Telegram collaborators from
//! [`Settings`] and wires them into the issuer, the delivery handler and the
//! axum router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use soutu_proxy::clock::{SharedClock, SystemClock};
use soutu_proxy::delivery::{DeliveryDeps, DeliveryHandler};
use soutu_proxy::http::{AppState, router};
use soutu_proxy::issuer::UrlIssuer;
use soutu_proxy::store::{MemoryStore, SharedStore};
use soutu_proxy::token::TokenStore;
use soutu_telegram::TelegramClient;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::settings::{Settings, StoreBackend};

/// Everything a running server holds on to
#[derive(Debug, Clone)]
pub struct Services {
    /// Link issuer
    pub issuer: Arc<UrlIssuer>,
    /// Delivery pipeline
    pub delivery: Arc<DeliveryHandler>,
    /// Backing store
    pub store: SharedStore,
    /// Set when the memory backend is used, for the purge task
    pub memory: Option<Arc<MemoryStore>>,
}

/// Open the configured store
///
/// # Errors
///
/// Fails when Redis is selected but unreachable, or when this binary was
/// built without the `redis` feature.
pub async fn open_store(
    settings: &Settings,
    clock: SharedClock,
) -> anyhow::Result<(SharedStore, Option<Arc<MemoryStore>>)> {
    match settings.store.backend {
        StoreBackend::Memory => {
            let memory = Arc::new(MemoryStore::with_clock(clock));
            let shared: SharedStore = memory.clone();
            Ok((shared, Some(memory)))
        }
        StoreBackend::Redis => open_redis(settings).await.map(|store| (store, None)),
    }
}

#[cfg(feature = "redis")]
async fn open_redis(settings: &Settings) -> anyhow::Result<SharedStore> {
    let url = settings
        .store
        .redis_url
        .as_deref()
        .context("store.redis_url is required for the redis backend")?;
    let store = soutu_proxy::store::redis::RedisStore::connect(url).await?;
    info!("connected to Redis store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_settings: &Settings) -> anyhow::Result<SharedStore> {
    anyhow::bail!("store.backend = \"redis\" needs soutu-server built with the `redis` feature")
}

/// Build the issuer and delivery handler
///
/// # Errors
///
/// Configuration errors (no signing secret, no bot token outside mock mode)
/// and store connection failures.
pub async fn build_services(settings: &Settings) -> anyhow::Result<Services> {
    let clock: SharedClock = Arc::new(SystemClock);
    build_services_with_clock(settings, clock).await
}

/// [`build_services`] with an injected clock
///
/// # Errors
///
/// See [`build_services`].
pub async fn build_services_with_clock(
    settings: &Settings,
    clock: SharedClock,
) -> anyhow::Result<Services> {
    let config = settings.proxy_config();
    config.validate()?;
    let key = settings.signing_key()?;
    let keys = settings.key_space();
    let (store, memory) = open_store(settings, clock.clone()).await?;

    let telegram = Arc::new(
        TelegramClient::new(settings.telegram_config())
            .context("failed to build Telegram client")?,
    );
    let fetcher = Arc::new(telegram.file_fetcher());
    if telegram.is_mock() {
        info!("Telegram mock mode: getFile is answered locally");
    }

    let issuer = UrlIssuer::new(
        &config,
        key.clone(),
        TokenStore::new(store.clone(), keys.clone()),
        clock.clone(),
    );
    let delivery = DeliveryHandler::new(
        &config,
        DeliveryDeps {
            key,
            store: store.clone(),
            keys,
            resolver: telegram,
            fetcher,
            clock,
        },
    );

    debug!(?config, "services built");
    Ok(Services {
        issuer: Arc::new(issuer),
        delivery: Arc::new(delivery),
        store,
        memory,
    })
}

/// Router over `services`
///
/// # Errors
///
/// Fails on an admin key shorter than the minimum length.
pub fn build_router(settings: &Settings, services: &Services) -> anyhow::Result<Router> {
    let state = AppState {
        delivery: services.delivery.clone(),
        issuer: services.issuer.clone(),
        admin: settings.admin_key()?,
    };
    if state.admin.is_some() {
        info!("internal issuance API enabled");
    }
    Ok(router(state, &settings.server.path_prefix))
}

/// Periodically drop expired entries from the memory store
pub fn spawn_purge_task(store: Arc<MemoryStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "purged expired store entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use soutu_proxy::clock::ManualClock;
    use soutu_proxy::store::KvStore;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.signing.secret = Some("app-test-secret".into());
        settings.telegram.mock = true;
        settings
    }

    #[tokio::test]
    async fn test_build_services_with_memory_store() {
        let services = build_services(&settings()).await.unwrap();
        assert!(services.memory.is_some());
        let link = services.issuer.issue("img_42", "u_7").await.unwrap();
        assert!(link.url.starts_with("http://127.0.0.1:8787/search/proxy?file_id=img_42&"));
    }

    #[tokio::test]
    async fn test_missing_secret_is_fatal() {
        let mut settings = settings();
        settings.signing.secret = None;
        assert!(build_services(&settings).await.is_err());
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_backend_needs_feature() {
        let mut settings = settings();
        settings.store.backend = StoreBackend::Redis;
        settings.store.redis_url = Some("redis://127.0.0.1:6379/".to_string());
        let err = build_services(&settings).await.unwrap_err();
        assert!(err.to_string().contains("redis"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_sweeps() {
        let clock = ManualClock::new(1_000);
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        store
            .put("k", "v", Duration::from_secs(5))
            .await
            .unwrap();
        clock.advance(10);

        let handle = spawn_purge_task(store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());
        handle.abort();
    }
}
