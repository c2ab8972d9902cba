//! Forecast artifact types
//!
//! Field names on the wire follow the training service's JSON
//! (`volumeInLiters` and its `_lower`/`_upper` bounds); the artifact written
//! by the forecast store reuses the same point schema so the presentation
//! layer reads what the service produced.

use super::upload::TrainingMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Daily forecast point, e.g. `date = "2026-01-07"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    #[serde(rename = "volumeInLiters")]
    pub volume_liters: f64,
    #[serde(rename = "volumeInLiters_lower")]
    pub volume_liters_lower: f64,
    #[serde(rename = "volumeInLiters_upper")]
    pub volume_liters_upper: f64,
}

/// Weekly forecast point, e.g. `week = "2026-01-05/2026-01-11"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyForecast {
    pub week: String,
    #[serde(rename = "volumeInLiters")]
    pub volume_liters: f64,
    #[serde(rename = "volumeInLiters_lower")]
    pub volume_liters_lower: f64,
    #[serde(rename = "volumeInLiters_upper")]
    pub volume_liters_upper: f64,
}

/// Monthly forecast point, e.g. `month = "2026-01"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyForecast {
    pub month: String,
    #[serde(rename = "volumeInLiters")]
    pub volume_liters: f64,
    #[serde(rename = "volumeInLiters_lower")]
    pub volume_liters_lower: f64,
    #[serde(rename = "volumeInLiters_upper")]
    pub volume_liters_upper: f64,
}

/// Provenance and accuracy metadata carried with the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    /// Model identifier reported by the training service
    pub model: String,
    /// When the training run that produced this artifact completed
    pub trained_on: DateTime<Utc>,
    /// First predicted date key
    pub prediction_date: String,
    /// Accuracy metrics from the held-out evaluation
    pub evaluation: TrainingMetrics,
}

/// The persisted forecast bundle currently considered authoritative
///
/// Exactly one artifact is current at any time; a successful retrain
/// replaces it wholesale, never patches it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastArtifact {
    pub daily: Vec<DailyForecast>,
    pub weekly: Vec<WeeklyForecast>,
    pub monthly: Vec<MonthlyForecast>,
    pub metadata: ForecastMetadata,
}
