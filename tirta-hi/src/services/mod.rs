//! Ingest pipeline services
//!
//! Each stage of the upload → retrain pipeline lives in its own module:
//! normalization, duplicate detection, consolidation, the training and
//! telemetry clients, the forecast store, and the orchestrator that ties
//! them together.

pub mod consolidator;
pub mod fingerprint;
pub mod forecast_store;
pub mod normalizer;
pub mod retrain;
pub mod telemetry;
pub mod training_client;

pub use consolidator::consolidate;
pub use fingerprint::{check_duplicate, sha256_hex, DuplicateCheck};
pub use forecast_store::ForecastStore;
pub use normalizer::{normalize, NormalizedDataset, ValidationError};
pub use retrain::{RetrainError, RetrainOrchestrator};
pub use telemetry::{HttpTelemetryExporter, TelemetryError, TelemetryExporter};
pub use training_client::{TrainingBackend, TrainingClient, TrainingError};
