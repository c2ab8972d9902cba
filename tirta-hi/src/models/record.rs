//! Consumption records and granularity

use serde::{Deserialize, Serialize};

/// Whether a record covers one calendar day or one calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Granularity::Daily),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(format!("Unknown granularity: {}", other)),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized consumption data point
///
/// `date` is the normalized ISO key: `YYYY-MM-DD` for daily records,
/// `YYYY-MM` for monthly ones. Within one validated dataset all records
/// share the same granularity. Immutable once produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub date: String,
    pub total_m3: f64,
}

impl ConsumptionRecord {
    pub fn new(date: impl Into<String>, total_m3: f64) -> Self {
        Self {
            date: date.into(),
            total_m3,
        }
    }
}
