//! Upload endpoints
//!
//! POST /api/uploads accepts a multipart CSV file, validates and fingerprints
//! it, stores the raw bytes, and registers the upload. A byte-identical
//! re-upload is answered with 409 carrying the existing record so the client
//! can retrain on it instead. GET serves the registry; DELETE clears the
//! registry, stored files and the current forecast in one stroke.

use crate::models::{DateRange, UploadRecord};
use crate::services::{check_duplicate, normalize, DuplicateCheck};
use crate::{ApiError, ApiResult, AppState, MAX_UPLOAD_BYTES};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload: UploadRecord,
    /// Per-row validation warnings (dropped rows, kept duplicates)
    pub warnings: Vec<String>,
    /// Whether a retrain was kicked off automatically
    pub auto_train: bool,
}

/// POST /api/uploads
pub async fn create_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let bytes = read_file_field(&mut multipart).await?;
    info!(size = bytes.len(), "Received upload");

    // Reject byte-identical re-uploads before doing any parsing work.
    let hash = match check_duplicate(&state.db, &bytes).await? {
        DuplicateCheck::Unique(hash) => hash,
        DuplicateCheck::Duplicate { existing, .. } => {
            let body = Json(json!({
                "error": {
                    "code": "DUPLICATE_UPLOAD",
                    "message": format!(
                        "This file was already uploaded on {} (upload {})",
                        existing.uploaded_at, existing.id
                    ),
                },
                "existing": existing,
            }));
            return Ok((StatusCode::CONFLICT, body).into_response());
        }
    };

    let dataset = match normalize(&bytes) {
        Ok(dataset) => dataset,
        Err(e) => {
            let body = Json(json!({
                "error": {
                    "code": "VALIDATION_FAILED",
                    "message": e.to_string(),
                },
                "errors": e.errors,
                "warnings": e.warnings,
            }));
            return Ok((StatusCode::BAD_REQUEST, body).into_response());
        }
    };

    // Persist the raw bytes first, then the registry row. A crash between
    // the two leaves an orphan file, never a registry row without its file.
    let stored_file_name = format!("upload_{}.csv", Utc::now().timestamp_millis());
    let uploads_dir = state.config.uploads_dir();
    tokio::fs::create_dir_all(&uploads_dir).await?;
    tokio::fs::write(uploads_dir.join(&stored_file_name), &bytes).await?;

    let range = DateRange {
        start: dataset
            .records
            .first()
            .map(|r| r.date.clone())
            .unwrap_or_default(),
        end: dataset
            .records
            .last()
            .map(|r| r.date.clone())
            .unwrap_or_default(),
    };
    let record = UploadRecord::new(
        stored_file_name,
        dataset.data_type,
        dataset.records.len(),
        range,
        hash,
    );
    crate::db::uploads::insert(&state.db, &record).await?;

    info!(
        upload_id = %record.id,
        rows = record.row_count,
        data_type = %record.data_type,
        "Upload registered"
    );
    state
        .event_bus
        .emit_lossy(tirta_common::events::TirtaEvent::UploadAccepted {
            upload_id: record.id,
            row_count: record.row_count,
            data_type: record.data_type.to_string(),
            timestamp: Utc::now(),
        });

    let auto_train = state.config.auto_train;
    if auto_train {
        let orchestrator = state.orchestrator.clone();
        let upload_id = record.id;
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(upload_id, true).await {
                warn!(upload_id = %upload_id, error = %e, "Automatic retrain failed");
            }
        });
    }

    let response = UploadResponse {
        upload: record,
        warnings: dataset.warnings,
        auto_train,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Pull the `file` part out of the multipart body, enforcing the size cap
async fn read_file_field(multipart: &mut Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file part: {}", e)))?;

        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge(format!(
                "File is {} bytes, limit is {}",
                bytes.len(),
                MAX_UPLOAD_BYTES
            )));
        }
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }

        return Ok(bytes.to_vec());
    }

    Err(ApiError::BadRequest(
        "Missing multipart field: file".to_string(),
    ))
}

/// GET /api/uploads
pub async fn list_uploads(State(state): State<AppState>) -> ApiResult<Json<Vec<UploadRecord>>> {
    let uploads = crate::db::uploads::list(&state.db).await?;
    Ok(Json(uploads))
}

/// GET /api/uploads/:id
pub async fn get_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UploadRecord>> {
    let upload = crate::db::uploads::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Upload {}", id)))?;
    Ok(Json(upload))
}

/// DELETE /api/uploads
///
/// Clears the registry, removes every stored upload file, and drops the
/// current forecast artifact. Used to reset the service to a clean slate.
pub async fn clear_uploads(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let uploads = crate::db::uploads::list(&state.db).await?;
    let uploads_dir = state.config.uploads_dir();

    for upload in &uploads {
        let path = uploads_dir.join(&upload.stored_file_name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove stored upload");
            }
        }
    }

    let cleared = crate::db::uploads::clear_all(&state.db).await?;
    state.forecast_store.clear()?;
    state
        .event_bus
        .emit_lossy(tirta_common::events::TirtaEvent::ForecastCleared {
            timestamp: Utc::now(),
        });

    info!(cleared, "Upload registry cleared");
    Ok(Json(json!({ "cleared": cleared })))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/uploads",
            post(create_upload).get(list_uploads).delete(clear_uploads),
        )
        .route("/api/uploads/:id", get(get_upload))
}
