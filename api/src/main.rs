use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use infrastructure::JsonFileStore;

mod config;
mod error;
mod routes;

use config::ServerConfig;
use routes::{AppState, build_router};

#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let config = ServerConfig::from_env();

    // --- Store ---
    let store = JsonFileStore::new(&config.database_path);
    if config.initialize_database {
        match store.initialize_if_missing().await {
            Ok(true) => info!(path = %store.path().display(), "Created empty store document."),
            Ok(false) => info!(path = %store.path().display(), "Using existing store document."),
            Err(e) => {
                error!("Failed to initialize store document: {}", e);
                std::process::exit(1);
            }
        }
    } else if !tokio::fs::try_exists(store.path()).await.unwrap_or(false) {
        warn!(
            path = %store.path().display(),
            "Store document not found; requests will fail until it exists. Set DATABASE_INIT=true to create it."
        );
    }

    // --- Dependency Injection ---
    let app_state = AppState::new(Arc::new(store));
    info!("Application services initialized.");

    let app = build_router(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server stopped.");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
