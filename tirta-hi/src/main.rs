//! tirta-hi - Historical Data Ingest Service
//!
//! Accepts historical water-consumption uploads, validates and registers
//! them, and drives model retraining against the external training service.
//! Serves the upload registry, retrain sessions and the current forecast
//! artifact over HTTP REST + SSE.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use tirta_common::events::EventBus;

use tirta_hi::config::IngestConfig;
use tirta_hi::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tirta-hi (Historical Data Ingest) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve configuration (env > config file > defaults)
    let config = IngestConfig::load();
    info!("Data folder: {}", config.data_folder.display());
    info!("Training service: {}", config.training_service_url);
    if config.telemetry_export_url.is_none() {
        info!("Telemetry export not configured, retrains use upload data only");
    }

    // Step 2: Create data folders if missing
    tirta_common::config::ensure_data_folder(&config.data_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize data folder: {}", e))?;
    tirta_common::config::ensure_data_folder(&config.uploads_dir())
        .map_err(|e| anyhow::anyhow!("Failed to initialize uploads folder: {}", e))?;

    // Step 3: Open or create database
    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = tirta_hi::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Create event bus for SSE broadcasting
    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    // Create application state
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db_pool, event_bus, config)?;

    // Build router
    let app = tirta_hi::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
