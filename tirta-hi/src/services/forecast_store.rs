//! Forecast artifact store
//!
//! Exactly one forecast artifact is current at any time. Writes go to a
//! temp sibling and are renamed over the live file, so readers never observe
//! a partial artifact. Clearing tolerates a missing file.

use crate::models::ForecastArtifact;
use std::path::{Path, PathBuf};
use tirta_common::{Error, Result};

const ARTIFACT_FILE: &str = "forecast_output.json";

/// Durable store for the current forecast artifact
#[derive(Debug, Clone)]
pub struct ForecastStore {
    path: PathBuf,
}

impl ForecastStore {
    /// Store rooted in the service data folder
    pub fn new(data_folder: &Path) -> Self {
        Self {
            path: data_folder.join(ARTIFACT_FILE),
        }
    }

    /// Replace the current artifact atomically
    pub fn write(&self, artifact: &ForecastArtifact) -> Result<()> {
        let json = serde_json::to_vec_pretty(artifact)
            .map_err(|e| Error::Internal(format!("Serialize forecast failed: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!(path = %self.path.display(), "Forecast artifact replaced");

        Ok(())
    }

    /// Read the current artifact, or None if absent/cleared
    pub fn read(&self) -> Result<Option<ForecastArtifact>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let artifact = serde_json::from_str(&content)
            .map_err(|e| Error::Internal(format!("Corrupt forecast artifact: {}", e)))?;
        Ok(Some(artifact))
    }

    /// Remove the current artifact; absence is not an error
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Forecast artifact cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
