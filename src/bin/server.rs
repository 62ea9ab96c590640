//! Daybook sync node
//!
//! Serves the snapshot exchange endpoints and, when the node resolves to the
//! client role, runs the background sync loop against its configured server.
//!
//! # Configuration
//!
//! Same YAML file and environment variables as the `daybook` CLI. The config
//! file path can be given with `DAYBOOK_CONFIG`.
//!
//! ```yaml
//! database_path: /var/lib/daybook/daybook.db
//! sync:
//!   role: server
//! server:
//!   port: 8080
//!   max_body_bytes: 67108864
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check
//! - `GET /api/sync`, `POST /api/sync`: Snapshot pull and push (server role)
//! - `GET /api/sync/status`: Sync loop status

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daybook::config::Config;
use daybook::db::{init_db, SqliteStore};
use daybook::server::{router, AppState, SyncService};
use daybook::sync::{ChangeNotifier, HttpPeer, SyncOrchestrator};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybook=info,daybook_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("DAYBOOK_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path)?;

    match &config.config_file {
        Some(path) => tracing::info!("Config file: {}", path.display()),
        None => tracing::info!("No config file found, using defaults"),
    }
    tracing::info!("Database: {}", config.database_path.value.display());
    tracing::info!("Configured role: {}", config.sync.role);

    let pool = init_db(config.database_path.value.clone()).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let notifier = ChangeNotifier::new();
    let peer = HttpPeer::new(Duration::from_secs(config.sync.timeout_secs))?;

    let orchestrator = Arc::new(SyncOrchestrator::new(
        store.clone(),
        Arc::new(peer),
        config.sync.clone(),
        notifier.clone(),
    ));
    let service = Arc::new(SyncService::new(
        store,
        config.sync.clone(),
        notifier.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // The loop re-resolves the role every tick, so a server node just idles.
    let sync_loop = orchestrator.clone().spawn(shutdown_rx.clone());
    let change_log = tokio::spawn(log_changes(notifier.subscribe(), shutdown_rx.clone()));

    let app = router(AppState {
        service,
        orchestrator,
        max_body_bytes: config.server.max_body_bytes,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await?;

    let _ = sync_loop.await;
    let _ = change_log.await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Logs every change event until shutdown.
async fn log_changes(
    mut events: broadcast::Receiver<daybook::sync::DataChanged>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => tracing::info!(?event, "Data changed"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Change log lagged, skipped {} event(s)", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
