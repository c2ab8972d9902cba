//! tirta-hi library interface
//!
//! Exposes the router, state and pipeline services for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use crate::config::IngestConfig;
use crate::services::{
    ForecastStore, HttpTelemetryExporter, RetrainOrchestrator, TrainingClient,
};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tirta_common::events::EventBus;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Orchestrator wired to the production training and telemetry clients
pub type Orchestrator = RetrainOrchestrator<TrainingClient, HttpTelemetryExporter>;

/// Hard cap on accepted upload file size
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Resolved service configuration
    pub config: Arc<IngestConfig>,
    /// Forecast artifact store
    pub forecast_store: ForecastStore,
    /// Retrain pipeline orchestrator
    pub orchestrator: Arc<Orchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire up production clients from the resolved configuration
    pub fn new(db: SqlitePool, event_bus: EventBus, config: IngestConfig) -> anyhow::Result<Self> {
        let forecast_store = ForecastStore::new(&config.data_folder);

        let training = TrainingClient::new(
            config.training_service_url.clone(),
            config.training_timeout,
        )
        .map_err(|e| anyhow::anyhow!("Training client init failed: {}", e))?;

        let telemetry = HttpTelemetryExporter::new(config.telemetry_export_url.clone())
            .map_err(|e| anyhow::anyhow!("Telemetry exporter init failed: {}", e))?;

        let orchestrator = RetrainOrchestrator::new(
            db.clone(),
            event_bus.clone(),
            training,
            telemetry,
            forecast_store.clone(),
            config.uploads_dir(),
            config.telemetry_device_id.clone(),
            config.telemetry_range.clone(),
        );

        Ok(Self {
            db,
            event_bus,
            config: Arc::new(config),
            forecast_store,
            orchestrator: Arc::new(orchestrator),
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::retrain_routes())
        .merge(api::forecast_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        // Slack on top of the cap so the multipart framing itself never
        // trips the transport-level limit before the handler checks.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
