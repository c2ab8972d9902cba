//! Forecast artifact endpoints

use crate::models::ForecastArtifact;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

/// GET /api/forecast
pub async fn get_forecast(State(state): State<AppState>) -> ApiResult<Json<ForecastArtifact>> {
    let artifact = state
        .forecast_store
        .read()?
        .ok_or_else(|| ApiError::NotFound("No forecast trained yet".to_string()))?;
    Ok(Json(artifact))
}

/// One month of the cost projection
#[derive(Debug, serde::Serialize)]
pub struct MonthlyCost {
    pub month: String,
    pub volume_m3: f64,
    /// Estimated bill under the tiered tariff, Rupiah
    pub estimated_cost: i64,
}

/// GET /api/forecast/cost
///
/// Projects the tiered tariff onto the monthly forecast points.
pub async fn forecast_cost(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let artifact = state
        .forecast_store
        .read()?
        .ok_or_else(|| ApiError::NotFound("No forecast trained yet".to_string()))?;

    let tiers = tirta_common::pricing::default_tiers();
    let monthly: Vec<MonthlyCost> = artifact
        .monthly
        .iter()
        .map(|point| {
            let volume_m3 = point.volume_liters / 1000.0;
            MonthlyCost {
                month: point.month.clone(),
                volume_m3,
                estimated_cost: tirta_common::pricing::water_cost(volume_m3, &tiers),
            }
        })
        .collect();

    Ok(Json(json!({ "tiers": tiers, "monthly": monthly })))
}

/// DELETE /api/forecast
pub async fn clear_forecast(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.forecast_store.clear()?;
    state
        .event_bus
        .emit_lossy(tirta_common::events::TirtaEvent::ForecastCleared {
            timestamp: Utc::now(),
        });
    info!("Forecast artifact cleared by request");
    Ok(Json(json!({ "cleared": true })))
}

/// Build forecast routes
pub fn forecast_routes() -> Router<AppState> {
    Router::new()
        .route("/api/forecast", get(get_forecast).delete(clear_forecast))
        .route("/api/forecast/cost", get(forecast_cost))
}
