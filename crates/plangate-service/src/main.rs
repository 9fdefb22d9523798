//! Plangate Service - subscription entitlements and processor webhooks
//!
//! This is the main entry point for the plangate service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plangate_service::catalog::import_catalog_file;
use plangate_service::{create_router, AppState, ServiceConfig};
use plangate_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plangate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Plangate Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        processors = ?config.payment_processors,
        default_processor = ?config.default_processor,
        webhook_ordering = ?config.webhook_ordering,
        catalog_path = ?config.catalog_path,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    if let Some(path) = &config.catalog_path {
        import_catalog_file(store.as_ref(), path, &config.catalog_defaults()).await?;
    }

    // Build app state
    let state = AppState::from_config(store, config.clone())?;

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, plangate_store::StoreError> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(plangate_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, plangate_store::StoreError> {
    tracing::warn!("Built without rocksdb-backend - state is kept in memory only");
    Ok(Arc::new(plangate_store::MemoryStore::new()))
}
