//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TOML configuration file contents (`~/.config/tirta/config.toml`)
///
/// Every field is optional; environment variables override the file, and
/// compiled defaults fill whatever remains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder holding the database, stored uploads and forecast artifact
    pub data_folder: Option<String>,
    /// Base URL of the external training service
    pub training_service_url: Option<String>,
    /// Training call timeout in seconds
    pub training_timeout_seconds: Option<u64>,
    /// Base URL of the time-series storage engine's export endpoint
    pub telemetry_export_url: Option<String>,
    /// Meter device queried for recent telemetry
    pub telemetry_device_id: Option<String>,
    /// Trailing window requested from the telemetry export (e.g. `-30d`)
    pub telemetry_range: Option<String>,
    /// Trigger a retrain automatically after each accepted upload
    pub auto_train: Option<bool>,
}

/// Resolve the data folder, priority order:
/// 1. Environment variable (highest)
/// 2. TOML config file
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(env_var_name: &str) -> PathBuf {
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    if let Ok(config) = load_toml_config() {
        if let Some(folder) = config.data_folder {
            return PathBuf::from(folder);
        }
    }

    default_data_folder()
}

/// Load the TOML config file if one exists at the platform config path
pub fn load_toml_config() -> Result<TomlConfig> {
    let path = config_file_path()?;
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Platform config file path (`<config dir>/tirta/config.toml`)
fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir()
        .map(|d| d.join("tirta").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if user_config.exists() {
        return Ok(user_config);
    }

    let system_config = PathBuf::from("/etc/tirta/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tirta"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/tirta"))
}

/// Ensure the data folder exists, creating it if missing
pub fn ensure_data_folder(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!("Created data folder: {}", path.display());
    }
    Ok(())
}
