//! Retrain endpoints
//!
//! POST /api/retrain runs a full retrain synchronously and answers with the
//! training result; failures map to statuses that distinguish a bad request
//! (unknown upload), a busy pipeline, a timeout and a remote failure.
//! Session state and logs are also queryable after the fact.

use crate::models::{RetrainSession, TrainingResult};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

fn default_use_telemetry() -> bool {
    true
}

/// POST /api/retrain request body
#[derive(Debug, Deserialize)]
pub struct RetrainRequest {
    pub upload_id: Uuid,
    /// Fold recent telemetry into the training set (default true)
    #[serde(default = "default_use_telemetry")]
    pub use_telemetry: bool,
}

/// POST /api/retrain
pub async fn trigger_retrain(
    State(state): State<AppState>,
    Json(request): Json<RetrainRequest>,
) -> ApiResult<Json<TrainingResult>> {
    info!(
        upload_id = %request.upload_id,
        use_telemetry = request.use_telemetry,
        "Retrain requested"
    );

    let result = state
        .orchestrator
        .run(request.upload_id, request.use_telemetry)
        .await?;

    Ok(Json(result))
}

/// GET /api/retrain/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<RetrainSession>> {
    let session = crate::db::sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Retrain session {}", session_id)))?;
    Ok(Json(session))
}

/// Build retrain routes
pub fn retrain_routes() -> Router<AppState> {
    Router::new()
        .route("/api/retrain", post(trigger_retrain))
        .route("/api/retrain/sessions/:id", get(get_session))
}
