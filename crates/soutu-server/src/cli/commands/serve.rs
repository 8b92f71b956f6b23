//! Serve command implementation
//!
//! Binds the listener, serves the router with the client address attached
//! to every request, and drains in-flight requests on Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::{info, warn};

use crate::app::{build_router, build_services, spawn_purge_task};
use crate::settings::Settings;

/// Run the HTTP server
///
/// # Examples
///
///   soutu-server --config soutu.toml serve
///
///   TG_PROXY_SECRET=... BOT_TOKEN=... soutu-server serve --bind 0.0.0.0:8787
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Bind address, overriding `server.bind`
    ///
    /// WARNING: Binding to 0.0.0.0 exposes the proxy on every interface.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

impl ServeCommand {
    /// Execute the serve command
    ///
    /// # Errors
    ///
    /// Invalid configuration, bind failures and server I/O errors.
    pub async fn execute(self, mut settings: Settings) -> anyhow::Result<()> {
        if let Some(bind) = self.bind {
            settings.server.bind = bind;
        }
        settings.validate()?;

        let services = build_services(&settings).await?;
        let app = build_router(&settings, &services)?;

        let purge = services.memory.clone().map(|store| {
            spawn_purge_task(
                store,
                Duration::from_secs(settings.store.purge_interval_secs),
            )
        });

        let addr: SocketAddr = settings
            .server
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: {}", settings.server.bind))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!(
            bind = %addr,
            public_base_url = %settings.server.public_base_url,
            path_prefix = %settings.server.path_prefix,
            store = ?settings.store.backend,
            edge_cache = ?settings.edge_cache.mode,
            "soutu-server listening"
        );

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Some(handle) = purge {
            handle.abort();
        }
        result.context("server error")?;
        info!("soutu-server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl+C received, initiating shutdown"),
        () = terminate => info!("SIGTERM received, initiating shutdown"),
    }
}
