//! Training service client
//!
//! Submits the consolidated dataset to the external training service as a
//! multipart POST (CSV attachment under the conventional `file` field) and
//! decodes the returned forecast with a strict schema: missing required
//! metric fields are a decode error, never a silent zero.
//!
//! The call is bounded by an explicit timeout; on expiry the in-flight
//! request future is dropped, which aborts the underlying connection.

use crate::models::{ConsumptionRecord, DailyForecast, MonthlyForecast, TrainingMetrics, WeeklyForecast};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("tirta-hi/", env!("CARGO_PKG_VERSION"));
const ATTACHMENT_NAME: &str = "training_data.csv";

/// Training submission failures
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The service did not respond within the configured budget; retryable
    #[error("training timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Non-2xx response; body text preserved verbatim
    #[error("training failed ({status}): {detail}")]
    RemoteFailed { status: u16, detail: String },

    /// Connection-level failure before any response arrived
    #[error("training service unreachable: {0}")]
    Unreachable(String),

    /// 2xx response whose body did not match the expected schema
    #[error("training response decode failed: {0}")]
    Decode(String),

    /// Dataset could not be serialized for submission
    #[error("dataset serialization failed: {0}")]
    Serialize(String),
}

/// Successful training response (strict wire schema)
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingResponse {
    pub daily: Vec<DailyForecast>,
    pub weekly: Vec<WeeklyForecast>,
    pub monthly: Vec<MonthlyForecast>,
    pub metrics: TrainingMetrics,
    #[serde(default)]
    pub model: Option<String>,
}

/// Something that can turn a dataset into a forecast
#[allow(async_fn_in_trait)]
pub trait TrainingBackend {
    async fn submit(&self, records: &[ConsumptionRecord]) -> Result<TrainingResponse, TrainingError>;
}

/// Reqwest-based client for the external training service
pub struct TrainingClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TrainingClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, TrainingError> {
        // No client-level timeout: the whole call is bounded explicitly in
        // submit() so the budget covers connect + upload + training.
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrainingError::Unreachable(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    fn train_url(&self) -> String {
        format!("{}/api/train", self.base_url.trim_end_matches('/'))
    }
}

impl TrainingBackend for TrainingClient {
    async fn submit(&self, records: &[ConsumptionRecord]) -> Result<TrainingResponse, TrainingError> {
        let csv_bytes = dataset_to_csv(records)?;

        let part = Part::bytes(csv_bytes)
            .file_name(ATTACHMENT_NAME)
            .mime_str("text/csv")
            .map_err(|e| TrainingError::Serialize(e.to_string()))?;
        let form = Form::new().part("file", part);

        tracing::info!(
            url = %self.train_url(),
            rows = records.len(),
            timeout_seconds = self.timeout.as_secs(),
            "Submitting dataset to training service"
        );

        let request = self.http.post(self.train_url()).multipart(form).send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| TrainingError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| TrainingError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TrainingError::RemoteFailed {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<TrainingResponse>()
            .await
            .map_err(|e| TrainingError::Decode(e.to_string()))
    }
}

/// Serialize records into the `date,total_m3` CSV the service expects
pub fn dataset_to_csv(records: &[ConsumptionRecord]) -> Result<Vec<u8>, TrainingError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(["date", "total_m3"])
        .map_err(|e| TrainingError::Serialize(e.to_string()))?;

    for record in records {
        writer
            .write_record([record.date.as_str(), &record.total_m3.to_string()])
            .map_err(|e| TrainingError::Serialize(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| TrainingError::Serialize(e.to_string()))
}
