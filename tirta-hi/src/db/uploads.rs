//! Upload registry queries
//!
//! Durable, append-only catalog of accepted uploads, keyed by upload id and
//! indexed by file fingerprint for duplicate lookup. The registry is the
//! single source of truth for "has this data already been processed".

use crate::models::{DateRange, Granularity, TrainingResult, UploadRecord, UploadStatus};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tirta_common::{Error, Result};
use uuid::Uuid;

type UploadRow = (
    String,         // id
    String,         // stored_file_name
    String,         // uploaded_at
    String,         // data_type
    i64,            // row_count
    String,         // range_start
    String,         // range_end
    String,         // file_hash
    String,         // status
    Option<String>, // training_result JSON
);

const SELECT_COLUMNS: &str = "id, stored_file_name, uploaded_at, data_type, row_count, \
     range_start, range_end, file_hash, status, training_result";

fn row_to_record(row: UploadRow) -> Result<UploadRecord> {
    let (id, stored_file_name, uploaded_at, data_type, row_count, start, end, file_hash, status, result_json) =
        row;

    let training_result: Option<TrainingResult> = match result_json {
        Some(json) if !json.is_empty() => Some(
            serde_json::from_str(&json)
                .map_err(|e| Error::Internal(format!("Corrupt training_result JSON: {}", e)))?,
        ),
        _ => None,
    };

    Ok(UploadRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?,
        stored_file_name,
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)
            .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?
            .with_timezone(&Utc),
        data_type: data_type
            .parse::<Granularity>()
            .map_err(Error::Internal)?,
        row_count: row_count.max(0) as usize,
        date_range: DateRange { start, end },
        file_hash,
        status: status.parse::<UploadStatus>().map_err(Error::Internal)?,
        training_result,
    })
}

/// Insert a newly accepted upload
pub async fn insert(pool: &SqlitePool, record: &UploadRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO uploads
            (id, stored_file_name, uploaded_at, data_type, row_count,
             range_start, range_end, file_hash, status, training_result)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.stored_file_name)
    .bind(record.uploaded_at.to_rfc3339())
    .bind(record.data_type.as_str())
    .bind(record.row_count as i64)
    .bind(&record.date_range.start)
    .bind(&record.date_range.end)
    .bind(&record.file_hash)
    .bind(record.status.as_str())
    .execute(pool)
    .await?;

    tracing::debug!(upload_id = %record.id, "Upload registered");

    Ok(())
}

/// Look up one upload by id
pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<UploadRecord>> {
    let row: Option<UploadRow> = sqlx::query_as(&format!(
        "SELECT {} FROM uploads WHERE id = ?",
        SELECT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(row_to_record).transpose()
}

/// Look up an upload by its content fingerprint
pub async fn find_by_hash(pool: &SqlitePool, file_hash: &str) -> Result<Option<UploadRecord>> {
    let row: Option<UploadRow> = sqlx::query_as(&format!(
        "SELECT {} FROM uploads WHERE file_hash = ? LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(file_hash)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_record).transpose()
}

/// List every registered upload, newest first
pub async fn list(pool: &SqlitePool) -> Result<Vec<UploadRecord>> {
    let rows: Vec<UploadRow> = sqlx::query_as(&format!(
        "SELECT {} FROM uploads ORDER BY uploaded_at DESC",
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_record).collect()
}

/// Update an upload's processing status
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: UploadStatus) -> Result<()> {
    let result = sqlx::query("UPDATE uploads SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Upload not found: {}", id)));
    }

    tracing::debug!(upload_id = %id, status = status.as_str(), "Upload status updated");

    Ok(())
}

/// Attach a training result and set the final status in one write
pub async fn attach_training_result(
    pool: &SqlitePool,
    id: Uuid,
    status: UploadStatus,
    result: &TrainingResult,
) -> Result<()> {
    let json = serde_json::to_string(result)
        .map_err(|e| Error::Internal(format!("Serialize training result failed: {}", e)))?;

    let outcome = sqlx::query("UPDATE uploads SET status = ?, training_result = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(json)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if outcome.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Upload not found: {}", id)));
    }

    Ok(())
}

/// Administrative clear: delete every registry row
pub async fn clear_all(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM uploads").execute(pool).await?;
    Ok(result.rows_affected())
}
