//! Retrain orchestrator
//!
//! Drives one end-to-end retrain invocation for an upload:
//! load the stored file → re-normalize → merge with a telemetry export →
//! submit to the training service under a bounded timeout → persist the
//! forecast artifact → update the registry. Durable status updates happen
//! before errors propagate, so a status read after a failed call is never
//! stale relative to the returned error.
//!
//! Concurrent retrains for the same upload are rejected via an in-memory
//! single-flight set; retrains for different uploads run independently.

use crate::models::{
    ForecastArtifact, ForecastMetadata, ForecastSummary, RetrainSession, TrainingResult,
    UploadRecord, UploadStatus,
};
use crate::services::consolidator::consolidate;
use crate::services::forecast_store::ForecastStore;
use crate::services::normalizer;
use crate::services::telemetry::TelemetryExporter;
use crate::services::training_client::{TrainingBackend, TrainingError, TrainingResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tirta_common::events::{EventBus, LogLevel, RetrainState, TirtaEvent};
use uuid::Uuid;

/// Retrain failures, typed so callers can offer distinct retry affordances
#[derive(Debug, Error)]
pub enum RetrainError {
    #[error("Upload not found: {0}")]
    NotFound(Uuid),

    #[error("Retrain already in progress for upload {0}")]
    AlreadyRunning(Uuid),

    #[error("Stored upload file missing: {0}")]
    MissingArtifact(String),

    #[error("Stored upload failed re-validation: {0}")]
    InvalidStoredData(String),

    #[error("Training timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Remote training failed: {detail}")]
    RemoteTrainingFailed {
        status: Option<u16>,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tirta_common::Error> for RetrainError {
    fn from(e: tirta_common::Error) -> Self {
        match e {
            tirta_common::Error::Database(e) => RetrainError::Database(e),
            other => RetrainError::Internal(other.to_string()),
        }
    }
}

/// Removes its upload id from the single-flight set when dropped
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    upload_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.upload_id);
    }
}

/// Orchestrates the upload → consolidate → train → persist pipeline
///
/// Collaborators are injected so tests can substitute doubles for the
/// training service and the telemetry exporter.
pub struct RetrainOrchestrator<B, X> {
    db: SqlitePool,
    event_bus: EventBus,
    training: B,
    telemetry: X,
    forecast_store: ForecastStore,
    uploads_dir: PathBuf,
    device_id: String,
    telemetry_range: String,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl<B, X> RetrainOrchestrator<B, X>
where
    B: TrainingBackend,
    X: TelemetryExporter,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        training: B,
        telemetry: X,
        forecast_store: ForecastStore,
        uploads_dir: PathBuf,
        device_id: String,
        telemetry_range: String,
    ) -> Self {
        Self {
            db,
            event_bus,
            training,
            telemetry,
            forecast_store,
            uploads_dir,
            device_id,
            telemetry_range,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Execute one retrain invocation for an upload
    pub async fn run(
        &self,
        upload_id: Uuid,
        use_telemetry: bool,
    ) -> Result<TrainingResult, RetrainError> {
        let _guard = self
            .try_begin(upload_id)
            .ok_or(RetrainError::AlreadyRunning(upload_id))?;

        let start = Instant::now();
        let mut session = RetrainSession::new(upload_id);

        tracing::info!(
            session_id = %session.session_id,
            upload_id = %upload_id,
            "Starting retrain"
        );
        self.event_bus.emit_lossy(TirtaEvent::RetrainStarted {
            session_id: session.session_id,
            upload_id,
            timestamp: Utc::now(),
        });

        // Step 1: look up the upload record.
        let Some(upload) = crate::db::uploads::find(&self.db, upload_id).await? else {
            self.log(&mut session, LogLevel::Error, "Upload not found");
            self.finish_error(&mut session, "Upload not found").await?;
            return Err(RetrainError::NotFound(upload_id));
        };

        // Step 2: mark in progress immediately so concurrent status queries
        // see it even while the slow steps run.
        crate::db::uploads::set_status(&self.db, upload_id, UploadStatus::Training).await?;

        // Step 3: load the stored file bytes.
        self.transition(&mut session, RetrainState::Uploading).await?;
        let file_path = self.uploads_dir.join(&upload.stored_file_name);
        let raw = match tokio::fs::read(&file_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let message = format!("Stored file missing: {}", upload.stored_file_name);
                self.log(&mut session, LogLevel::Error, &message);
                crate::db::uploads::set_status(&self.db, upload_id, UploadStatus::Failed).await?;
                self.finish_error(&mut session, &message).await?;
                return Err(RetrainError::MissingArtifact(upload.stored_file_name));
            }
            Err(e) => {
                let message = format!(
                    "Read stored file {} failed: {}",
                    upload.stored_file_name, e
                );
                self.log(&mut session, LogLevel::Error, &message);
                crate::db::uploads::set_status(&self.db, upload_id, UploadStatus::Failed).await?;
                self.finish_error(&mut session, &message).await?;
                return Err(RetrainError::Internal(message));
            }
        };
        self.log(
            &mut session,
            LogLevel::Info,
            format!("Loaded stored file {} ({} bytes)", upload.stored_file_name, raw.len()),
        );

        // Step 4: re-normalize. The file passed validation at upload time,
        // so a failure here is an internal inconsistency, not a user error.
        self.transition(&mut session, RetrainState::Validating).await?;
        let dataset = match normalizer::normalize(&raw) {
            Ok(dataset) => dataset,
            Err(e) => {
                let message = format!("Stored file failed re-validation: {}", e);
                self.log(&mut session, LogLevel::Error, &message);
                crate::db::uploads::set_status(&self.db, upload_id, UploadStatus::Failed).await?;
                self.finish_error(&mut session, &message).await?;
                return Err(RetrainError::InvalidStoredData(e.to_string()));
            }
        };
        self.log(
            &mut session,
            LogLevel::Info,
            format!("Re-validated {} rows ({})", dataset.records.len(), dataset.data_type),
        );

        // Step 5: optional telemetry export; failures downgrade to warnings.
        let export = if use_telemetry {
            match self
                .telemetry
                .export_range(&self.device_id, &self.telemetry_range, dataset.data_type)
                .await
            {
                Ok(records) => {
                    self.log(
                        &mut session,
                        LogLevel::Info,
                        format!("Exported {} telemetry rows", records.len()),
                    );
                    records
                }
                Err(e) => {
                    self.log(
                        &mut session,
                        LogLevel::Warning,
                        format!("Telemetry export unavailable, continuing without it: {}", e),
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // Step 6: consolidate; the export comes last so it wins overlaps.
        let combined = consolidate(dataset.records, export);
        self.log(
            &mut session,
            LogLevel::Info,
            format!("Consolidated dataset: {} unique rows", combined.len()),
        );

        // Steps 7-8: bounded submission to the training service.
        self.transition(&mut session, RetrainState::Training).await?;

        let response = match self.training.submit(&combined).await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = start.elapsed().as_secs();
                return Err(self
                    .fail_training(&mut session, &upload, e, elapsed)
                    .await?);
            }
        };

        // Step 9: persist the artifact and record the outcome.
        self.transition(&mut session, RetrainState::Saving).await?;

        let artifact = build_artifact(&response);
        if let Err(e) = self.forecast_store.write(&artifact) {
            // The expensive remote computation succeeded; a local persistence
            // failure is reported separately, not reclassified as a training
            // failure.
            tracing::error!(upload_id = %upload_id, error = %e, "Forecast store write failed");
            self.log(
                &mut session,
                LogLevel::Error,
                format!("Forecast store write failed: {}", e),
            );
        }

        let elapsed = start.elapsed().as_secs();
        let result = TrainingResult {
            success: true,
            training_time_seconds: elapsed,
            error: None,
            metrics: Some(response.metrics.clone()),
            forecast_summary: Some(ForecastSummary {
                daily_count: response.daily.len(),
                weekly_count: response.weekly.len(),
                monthly_count: response.monthly.len(),
            }),
        };

        crate::db::uploads::attach_training_result(
            &self.db,
            upload_id,
            UploadStatus::Trained,
            &result,
        )
        .await?;

        self.log(
            &mut session,
            LogLevel::Info,
            format!("Training completed in {}s (MAPE {:.2}%)", elapsed, response.metrics.mape),
        );
        self.transition(&mut session, RetrainState::Completed).await?;

        self.event_bus.emit_lossy(TirtaEvent::RetrainCompleted {
            session_id: session.session_id,
            upload_id,
            training_time_seconds: elapsed,
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %session.session_id,
            upload_id = %upload_id,
            elapsed_seconds = elapsed,
            "Retrain completed"
        );

        Ok(result)
    }

    /// Claim the single-flight slot for an upload id
    fn try_begin(&self, upload_id: Uuid) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(upload_id) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            upload_id,
        })
    }

    /// Record a training-stage failure durably, then hand back the error
    ///
    /// The registry update happens before the error is returned so that a
    /// status read after the call is never stale.
    async fn fail_training(
        &self,
        session: &mut RetrainSession,
        upload: &UploadRecord,
        error: TrainingError,
        elapsed: u64,
    ) -> Result<RetrainError, RetrainError> {
        let retrain_error = match error {
            TrainingError::Timeout { seconds } => RetrainError::Timeout { seconds },
            TrainingError::RemoteFailed { status, detail } => RetrainError::RemoteTrainingFailed {
                status: Some(status),
                detail,
            },
            TrainingError::Unreachable(detail) => RetrainError::RemoteTrainingFailed {
                status: None,
                detail,
            },
            TrainingError::Decode(detail) => RetrainError::RemoteTrainingFailed {
                status: None,
                detail: format!("invalid response: {}", detail),
            },
            TrainingError::Serialize(detail) => RetrainError::Internal(detail),
        };

        let detail = retrain_error.to_string();
        let result = TrainingResult {
            success: false,
            training_time_seconds: elapsed,
            error: Some(detail.clone()),
            metrics: None,
            forecast_summary: None,
        };
        crate::db::uploads::attach_training_result(
            &self.db,
            upload.id,
            UploadStatus::Failed,
            &result,
        )
        .await?;

        self.log(session, LogLevel::Error, &detail);
        self.finish_error(session, &detail).await?;

        tracing::warn!(upload_id = %upload.id, error = %detail, "Retrain failed");

        Ok(retrain_error)
    }

    async fn transition(
        &self,
        session: &mut RetrainSession,
        state: RetrainState,
    ) -> Result<(), RetrainError> {
        session.transition_to(state);
        self.save_session(session).await?;
        self.event_bus.emit_lossy(TirtaEvent::RetrainStateChanged {
            session_id: session.session_id,
            upload_id: session.upload_id,
            state,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn finish_error(
        &self,
        session: &mut RetrainSession,
        reason: &str,
    ) -> Result<(), RetrainError> {
        session.transition_to(RetrainState::Error);
        self.save_session(session).await?;
        self.event_bus.emit_lossy(TirtaEvent::RetrainFailed {
            session_id: session.session_id,
            upload_id: session.upload_id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn save_session(&self, session: &RetrainSession) -> Result<(), RetrainError> {
        crate::db::sessions::save_session(&self.db, session).await?;
        Ok(())
    }

    fn log(&self, session: &mut RetrainSession, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(session_id = %session.session_id, "{}", message),
            LogLevel::Warning => tracing::warn!(session_id = %session.session_id, "{}", message),
            LogLevel::Error => tracing::error!(session_id = %session.session_id, "{}", message),
        }
        self.event_bus.emit_lossy(TirtaEvent::RetrainLog {
            session_id: session.session_id,
            level,
            message: message.clone(),
            timestamp: Utc::now(),
        });
        session.push_log(level, message);
    }
}

/// Build the persisted artifact from a training response
fn build_artifact(response: &TrainingResponse) -> ForecastArtifact {
    ForecastArtifact {
        daily: response.daily.clone(),
        weekly: response.weekly.clone(),
        monthly: response.monthly.clone(),
        metadata: ForecastMetadata {
            model: response
                .model
                .clone()
                .unwrap_or_else(|| "external".to_string()),
            trained_on: Utc::now(),
            prediction_date: response
                .daily
                .first()
                .map(|d| d.date.clone())
                .unwrap_or_default(),
            evaluation: response.metrics.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsumptionRecord, DailyForecast, DateRange, Granularity, TrainingMetrics};
    use crate::services::telemetry::TelemetryError;
    use tempfile::TempDir;

    struct OkTraining;

    impl TrainingBackend for OkTraining {
        async fn submit(
            &self,
            records: &[ConsumptionRecord],
        ) -> Result<TrainingResponse, TrainingError> {
            Ok(TrainingResponse {
                daily: vec![DailyForecast {
                    date: "2026-01-07".to_string(),
                    volume_liters: 1500.0,
                    volume_liters_lower: 1200.0,
                    volume_liters_upper: 1800.0,
                }],
                weekly: Vec::new(),
                monthly: Vec::new(),
                metrics: TrainingMetrics {
                    mae: 0.5,
                    rmse: 0.7,
                    mape: 8.2,
                    train_size: records.len() as i64,
                    test_size: 0,
                },
                model: Some("prophet".to_string()),
            })
        }
    }

    struct FailingTraining {
        status: u16,
        body: String,
    }

    impl TrainingBackend for FailingTraining {
        async fn submit(
            &self,
            _records: &[ConsumptionRecord],
        ) -> Result<TrainingResponse, TrainingError> {
            Err(TrainingError::RemoteFailed {
                status: self.status,
                detail: self.body.clone(),
            })
        }
    }

    struct NoTelemetry;

    impl TelemetryExporter for NoTelemetry {
        async fn export_range(
            &self,
            _device_id: &str,
            _range: &str,
            _granularity: Granularity,
        ) -> Result<Vec<ConsumptionRecord>, TelemetryError> {
            Err(TelemetryError::NotConfigured)
        }
    }

    struct FixedTelemetry(Vec<ConsumptionRecord>);

    impl TelemetryExporter for FixedTelemetry {
        async fn export_range(
            &self,
            _device_id: &str,
            _range: &str,
            _granularity: Granularity,
        ) -> Result<Vec<ConsumptionRecord>, TelemetryError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        pool: SqlitePool,
        event_bus: EventBus,
        data_dir: TempDir,
        upload_id: Uuid,
    }

    async fn setup(file_content: Option<&str>) -> Fixture {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();

        let data_dir = tempfile::tempdir().unwrap();
        let uploads = data_dir.path().join("historical");
        std::fs::create_dir_all(&uploads).unwrap();

        let stored_name = "upload_1.csv".to_string();
        if let Some(content) = file_content {
            std::fs::write(uploads.join(&stored_name), content).unwrap();
        }

        let record = UploadRecord::new(
            stored_name,
            Granularity::Daily,
            2,
            DateRange {
                start: "2025-01-01".to_string(),
                end: "2025-01-02".to_string(),
            },
            "hash".to_string(),
        );
        crate::db::uploads::insert(&pool, &record).await.unwrap();

        Fixture {
            pool,
            event_bus: EventBus::new(64),
            data_dir,
            upload_id: record.id,
        }
    }

    fn orchestrator<B: TrainingBackend, X: TelemetryExporter>(
        fixture: &Fixture,
        training: B,
        telemetry: X,
    ) -> RetrainOrchestrator<B, X> {
        RetrainOrchestrator::new(
            fixture.pool.clone(),
            fixture.event_bus.clone(),
            training,
            telemetry,
            ForecastStore::new(fixture.data_dir.path()),
            fixture.data_dir.path().join("historical"),
            "water_meter_01".to_string(),
            "-30d".to_string(),
        )
    }

    const DAILY_CSV: &str = "date,total_m3\n2025-01-01,1.5\n2025-01-02,2.0\n";

    #[tokio::test]
    async fn successful_retrain_marks_trained_and_writes_forecast() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        let result = orch.run(fixture.upload_id, false).await.unwrap();

        assert!(result.success);
        assert_eq!(result.forecast_summary.as_ref().unwrap().daily_count, 1);

        let upload = crate::db::uploads::find(&fixture.pool, fixture.upload_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upload.status, UploadStatus::Trained);
        assert!(upload.training_result.unwrap().success);

        let artifact = ForecastStore::new(fixture.data_dir.path())
            .read()
            .unwrap()
            .unwrap();
        assert_eq!(artifact.metadata.model, "prophet");
        assert_eq!(artifact.daily.len(), 1);
    }

    #[tokio::test]
    async fn unknown_upload_is_not_found() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        let err = orch.run(Uuid::new_v4(), false).await.unwrap_err();
        assert!(matches!(err, RetrainError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_stored_file_fails_with_missing_artifact() {
        let fixture = setup(None).await;
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        let err = orch.run(fixture.upload_id, false).await.unwrap_err();
        assert!(matches!(err, RetrainError::MissingArtifact(_)));

        let upload = crate::db::uploads::find(&fixture.pool, fixture.upload_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
    }

    #[tokio::test]
    async fn unreadable_stored_file_fails_durably() {
        let fixture = setup(None).await;
        // A directory where the stored file should be makes the read fail
        // with something other than NotFound.
        std::fs::create_dir(
            fixture
                .data_dir
                .path()
                .join("historical")
                .join("upload_1.csv"),
        )
        .unwrap();
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        let err = orch.run(fixture.upload_id, false).await.unwrap_err();
        assert!(matches!(err, RetrainError::Internal(_)));

        let upload = crate::db::uploads::find(&fixture.pool, fixture.upload_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);

        let sessions: Vec<(String,)> = sqlx::query_as("SELECT state FROM retrain_sessions")
            .fetch_all(&fixture.pool)
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].0, "error");
    }

    #[tokio::test]
    async fn remote_failure_sets_failed_and_preserves_detail() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(
            &fixture,
            FailingTraining {
                status: 500,
                body: "model error".to_string(),
            },
            NoTelemetry,
        );

        let err = orch.run(fixture.upload_id, true).await.unwrap_err();
        match err {
            RetrainError::RemoteTrainingFailed { status, detail } => {
                assert_eq!(status, Some(500));
                assert!(detail.contains("model error"));
            }
            other => panic!("Expected RemoteTrainingFailed, got {:?}", other),
        }

        let upload = crate::db::uploads::find(&fixture.pool, fixture.upload_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
        let result = upload.training_result.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("model error"));

        // The file and registry entry survive, so the user can retry
        // without re-uploading.
        assert!(fixture
            .data_dir
            .path()
            .join("historical")
            .join("upload_1.csv")
            .exists());
    }

    #[tokio::test]
    async fn telemetry_export_wins_overlapping_dates() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(
            &fixture,
            OkTraining,
            FixedTelemetry(vec![
                ConsumptionRecord::new("2025-01-02", 9.9),
                ConsumptionRecord::new("2025-01-03", 3.0),
            ]),
        );

        let result = orch.run(fixture.upload_id, true).await.unwrap();

        // 2 upload rows + 1 new export date, overlap deduplicated.
        assert_eq!(result.metrics.unwrap().train_size, 3);
    }

    #[tokio::test]
    async fn telemetry_failure_is_non_fatal_and_logged() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        let result = orch.run(fixture.upload_id, true).await.unwrap();
        assert!(result.success);

        // The warning is visible in the persisted session log.
        let sessions: Vec<(String,)> =
            sqlx::query_as("SELECT log FROM retrain_sessions")
                .fetch_all(&fixture.pool)
                .await
                .unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].0.contains("Telemetry export unavailable"));
    }

    #[tokio::test]
    async fn second_concurrent_retrain_is_rejected() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        let _guard = orch.try_begin(fixture.upload_id).unwrap();

        let err = orch.run(fixture.upload_id, false).await.unwrap_err();
        assert!(matches!(err, RetrainError::AlreadyRunning(_)));
    }

    #[tokio::test]
    async fn guard_release_allows_fresh_retrain() {
        let fixture = setup(Some(DAILY_CSV)).await;
        let orch = orchestrator(&fixture, OkTraining, NoTelemetry);

        {
            let _guard = orch.try_begin(fixture.upload_id).unwrap();
        }

        assert!(orch.run(fixture.upload_id, false).await.is_ok());
    }
}
