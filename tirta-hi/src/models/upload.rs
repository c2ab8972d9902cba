//! Upload registry records

use super::record::Granularity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of one accepted upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Accepted and registered, never trained
    Uploaded,
    /// A retrain invocation is in progress
    Training,
    /// Last retrain succeeded
    Trained,
    /// Last retrain failed; the file and registry entry remain intact
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Training => "training",
            UploadStatus::Trained => "trained",
            UploadStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(UploadStatus::Uploaded),
            "training" => Ok(UploadStatus::Training),
            "trained" => Ok(UploadStatus::Trained),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(format!("Unknown upload status: {}", other)),
        }
    }
}

/// Inclusive date range covered by an upload, normalized ISO keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Accuracy metrics returned by the training service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub train_size: i64,
    pub test_size: i64,
}

/// Counts of forecast points produced by one training run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub daily_count: usize,
    pub weekly_count: usize,
    pub monthly_count: usize,
}

/// Outcome of one training attempt, attached to the upload record
///
/// Recorded for failures too, with `success = false` and the failure detail
/// in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub success: bool,
    pub training_time_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_summary: Option<ForecastSummary>,
}

/// One accepted historical upload
///
/// Created at upload acceptance with status `uploaded`; mutated in place by
/// the retrain orchestrator as training progresses. Only the administrative
/// clear operation removes records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub stored_file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub data_type: Granularity,
    pub row_count: usize,
    pub date_range: DateRange,
    pub file_hash: String,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_result: Option<TrainingResult>,
}

impl UploadRecord {
    /// Create a fresh registry entry for a newly accepted file
    pub fn new(
        stored_file_name: String,
        data_type: Granularity,
        row_count: usize,
        date_range: DateRange,
        file_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stored_file_name,
            uploaded_at: Utc::now(),
            data_type,
            row_count,
            date_range,
            file_hash,
            status: UploadStatus::Uploaded,
            training_result: None,
        }
    }
}
