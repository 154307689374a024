//! tawkd - Tawk Daemon
//!
//! A real-time presence and direct-messaging server: WebSocket clients
//! register their connection under a user id, exchange friend requests, and
//! trade text/file messages persisted in per-pair conversations.

use std::sync::Arc;
use tawkd::config::Config;
use tawkd::db::Database;
use tawkd::dispatch::MessageDispatcher;
use tawkd::network::Gateway;
use tawkd::router::EventRouter;
use tawkd::state::ConnectionRegistry;
use tawkd::{http, metrics, storage};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(server = %config.server.name, "Starting tawkd");

    // Initialize database
    let db_path = config
        .database
        .as_ref()
        .map(|d| d.path.as_str())
        .unwrap_or("tawk.db");
    let db = Database::new(db_path).await?;

    // Presence is registry-backed; a fresh process has no live connections,
    // so any persisted online rows are stale shadows of a previous run.
    match db.users().reset_presence().await {
        Ok(count) if count > 0 => info!(count = count, "Cleared stale presence records"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to clear stale presence records"),
    }

    // Shared state and routing
    let registry = Arc::new(ConnectionRegistry::new());
    let router = EventRouter::new(Arc::clone(&registry));
    let store = storage::from_config(&config.storage);
    let dispatcher = MessageDispatcher::new(db.clone(), router.clone(), store);

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    // Start the Gateway (with optional TLS)
    let gateway = Gateway::bind(
        config.listen.address,
        config.tls,
        registry,
        router,
        dispatcher,
        db,
        config.limits,
    )
    .await?;

    gateway.run().await?;

    Ok(())
}
