mod api;
mod auth;
mod config;
mod state;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use catalog::{Catalog, CoverStore, ScanCoordinator};

use api::api_router;
use auth::SessionStore;
use config::{config_path_from_env, load_or_create_config, resolve_path};
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let session_ttl = Duration::from_secs(config.session_ttl_secs);

    let index_path = resolve_path(&config_path, &config.index_path);
    let catalog = Catalog::open(&index_path)?;

    let images_path = resolve_path(&config_path, &config.images_path);
    let placeholder = resolve_path(&config_path, &config.placeholder_cover);
    if !placeholder.exists() {
        warn!(
            "Placeholder cover not found at {}; empty playlists will have broken covers",
            placeholder.display()
        );
    }
    let covers = CoverStore::new(images_path, placeholder)?;

    let sessions = SessionStore::new(catalog.db(), session_ttl);
    if let Err(err) = sessions.init_tables() {
        warn!("Failed to create session table: {}", err);
    }

    let (scan_events, _) = broadcast::channel(256);
    let state = AppState {
        catalog,
        covers,
        sessions,
        scans: Arc::new(ScanCoordinator::new()),
        scan_events,
        config_path,
        config: Arc::new(RwLock::new(config)),
    };

    let app = Router::new()
        .nest("/api/v1", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
