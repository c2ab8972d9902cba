//! Telemetry export client
//!
//! Pulls a recent slice of live telemetry from the time-series storage
//! engine so retrains can fold fresh meter readings into the training set.
//! The orchestrator treats every failure here as non-fatal: forecasting on
//! upload data alone beats blocking on a transient storage outage.

use crate::models::{ConsumptionRecord, Granularity};
use std::time::Duration;
use thiserror::Error;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("tirta-hi/", env!("CARGO_PKG_VERSION"));

/// Telemetry export failures (absorbed as warnings by the orchestrator)
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry export not configured")]
    NotConfigured,

    #[error("telemetry export request failed: {0}")]
    Network(String),

    #[error("telemetry export returned status {0}")]
    Status(u16),

    #[error("telemetry export decode failed: {0}")]
    Decode(String),
}

/// Source of recent telemetry records
#[allow(async_fn_in_trait)]
pub trait TelemetryExporter {
    /// Export records for a device over a trailing range (e.g. `-30d`)
    async fn export_range(
        &self,
        device_id: &str,
        range: &str,
        granularity: Granularity,
    ) -> Result<Vec<ConsumptionRecord>, TelemetryError>;
}

/// HTTP exporter against the storage engine's export endpoint
pub struct HttpTelemetryExporter {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl HttpTelemetryExporter {
    /// `base_url = None` disables the exporter; every call reports
    /// `NotConfigured` and the orchestrator continues without telemetry.
    pub fn new(base_url: Option<String>) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(EXPORT_TIMEOUT)
            .build()
            .map_err(|e| TelemetryError::Network(e.to_string()))?;

        Ok(Self { http, base_url })
    }
}

impl TelemetryExporter for HttpTelemetryExporter {
    async fn export_range(
        &self,
        device_id: &str,
        range: &str,
        granularity: Granularity,
    ) -> Result<Vec<ConsumptionRecord>, TelemetryError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(TelemetryError::NotConfigured)?;

        let url = format!("{}/api/export", base.trim_end_matches('/'));

        tracing::debug!(device_id, range, granularity = %granularity, "Exporting telemetry");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("device_id", device_id),
                ("range", range),
                ("granularity", granularity.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TelemetryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }

        response
            .json::<Vec<ConsumptionRecord>>()
            .await
            .map_err(|e| TelemetryError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_exporter_reports_not_configured() {
        let exporter = HttpTelemetryExporter::new(None).unwrap();
        let err = exporter
            .export_range("water_meter_01", "-30d", Granularity::Daily)
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::NotConfigured));
    }
}
