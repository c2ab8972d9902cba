//! Data models for the historical ingest service

pub mod forecast;
pub mod record;
pub mod session;
pub mod upload;

pub use forecast::{
    DailyForecast, ForecastArtifact, ForecastMetadata, MonthlyForecast, WeeklyForecast,
};
pub use record::{ConsumptionRecord, Granularity};
pub use session::{RetrainSession, SessionLogEntry};
pub use upload::{DateRange, ForecastSummary, TrainingMetrics, TrainingResult, UploadRecord, UploadStatus};
