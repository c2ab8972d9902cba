//! Service configuration
//!
//! Settings resolve in priority order: environment variable, then the TOML
//! config file, then a compiled default. The service always starts; missing
//! optional integrations (telemetry export) simply stay disabled.

use std::path::PathBuf;
use std::time::Duration;
use tirta_common::config::{resolve_data_folder, TomlConfig};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "TIRTA_DATA_FOLDER";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5811";
const DEFAULT_TRAINING_URL: &str = "http://localhost:5000";
const DEFAULT_TRAINING_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DEVICE_ID: &str = "water_meter_01";
const DEFAULT_TELEMETRY_RANGE: &str = "-30d";

/// Resolved configuration for the historical ingest service
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Socket address the HTTP server binds to
    pub bind_addr: String,
    /// Folder holding the database, stored uploads and forecast artifact
    pub data_folder: PathBuf,
    /// Base URL of the external training service
    pub training_service_url: String,
    /// Budget for one training call, connect through response
    pub training_timeout: Duration,
    /// Export endpoint of the time-series storage engine, if deployed
    pub telemetry_export_url: Option<String>,
    /// Meter device queried for recent telemetry
    pub telemetry_device_id: String,
    /// Trailing window requested from the telemetry export
    pub telemetry_range: String,
    /// Kick off a retrain automatically after each accepted upload
    pub auto_train: bool,
}

impl IngestConfig {
    /// Resolve configuration from environment, config file and defaults
    pub fn load() -> Self {
        let toml = tirta_common::config::load_toml_config().unwrap_or_default();
        Self::from_sources(toml)
    }

    fn from_sources(toml: TomlConfig) -> Self {
        let training_service_url = env_string("TIRTA_TRAINING_URL")
            .or(toml.training_service_url)
            .unwrap_or_else(|| DEFAULT_TRAINING_URL.to_string());

        let timeout_seconds = env_string("TIRTA_TRAINING_TIMEOUT_SECONDS")
            .and_then(|v| v.parse().ok())
            .or(toml.training_timeout_seconds)
            .unwrap_or(DEFAULT_TRAINING_TIMEOUT_SECS);

        let telemetry_export_url =
            env_string("TIRTA_TELEMETRY_EXPORT_URL").or(toml.telemetry_export_url);

        let telemetry_device_id = env_string("TIRTA_TELEMETRY_DEVICE_ID")
            .or(toml.telemetry_device_id)
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string());

        let telemetry_range = env_string("TIRTA_TELEMETRY_RANGE")
            .or(toml.telemetry_range)
            .unwrap_or_else(|| DEFAULT_TELEMETRY_RANGE.to_string());

        let auto_train = env_string("TIRTA_AUTO_TRAIN")
            .and_then(|v| v.parse().ok())
            .or(toml.auto_train)
            .unwrap_or(true);

        Self {
            bind_addr: env_string("TIRTA_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            data_folder: resolve_data_folder(DATA_FOLDER_ENV),
            training_service_url,
            training_timeout: Duration::from_secs(timeout_seconds),
            telemetry_export_url,
            telemetry_device_id,
            telemetry_range,
            auto_train,
        }
    }

    /// Folder where accepted upload files are stored
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_folder.join("historical")
    }

    /// SQLite database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_folder.join("tirta.db")
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "TIRTA_BIND_ADDR",
            "TIRTA_TRAINING_URL",
            "TIRTA_TRAINING_TIMEOUT_SECONDS",
            "TIRTA_TELEMETRY_EXPORT_URL",
            "TIRTA_TELEMETRY_DEVICE_ID",
            "TIRTA_TELEMETRY_RANGE",
            "TIRTA_AUTO_TRAIN",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_when_nothing_configured() {
        clear_env();
        let config = IngestConfig::from_sources(TomlConfig::default());

        assert_eq!(config.bind_addr, "127.0.0.1:5811");
        assert_eq!(config.training_service_url, "http://localhost:5000");
        assert_eq!(config.training_timeout, Duration::from_secs(300));
        assert!(config.telemetry_export_url.is_none());
        assert_eq!(config.telemetry_device_id, "water_meter_01");
        assert_eq!(config.telemetry_range, "-30d");
        assert!(config.auto_train);
    }

    #[test]
    #[serial]
    fn env_overrides_toml() {
        clear_env();
        std::env::set_var("TIRTA_TRAINING_URL", "http://train.internal:8000");
        std::env::set_var("TIRTA_TRAINING_TIMEOUT_SECONDS", "60");

        let toml = TomlConfig {
            training_service_url: Some("http://from-toml:5000".to_string()),
            training_timeout_seconds: Some(120),
            ..TomlConfig::default()
        };
        let config = IngestConfig::from_sources(toml);

        assert_eq!(config.training_service_url, "http://train.internal:8000");
        assert_eq!(config.training_timeout, Duration::from_secs(60));

        clear_env();
    }

    #[test]
    #[serial]
    fn toml_fills_in_when_env_absent() {
        clear_env();
        let toml = TomlConfig {
            telemetry_export_url: Some("http://storage:8086".to_string()),
            telemetry_range: Some("-90d".to_string()),
            auto_train: Some(false),
            ..TomlConfig::default()
        };
        let config = IngestConfig::from_sources(toml);

        assert_eq!(
            config.telemetry_export_url.as_deref(),
            Some("http://storage:8086")
        );
        assert_eq!(config.telemetry_range, "-90d");
        assert!(!config.auto_train);
    }

    #[test]
    #[serial]
    fn telemetry_range_env_overrides_toml() {
        clear_env();
        std::env::set_var("TIRTA_TELEMETRY_RANGE", "-7d");

        let toml = TomlConfig {
            telemetry_range: Some("-90d".to_string()),
            ..TomlConfig::default()
        };
        let config = IngestConfig::from_sources(toml);
        assert_eq!(config.telemetry_range, "-7d");

        clear_env();
    }

    #[test]
    #[serial]
    fn derived_paths_hang_off_data_folder() {
        clear_env();
        std::env::set_var(DATA_FOLDER_ENV, "/tmp/tirta-config-test");
        let config = IngestConfig::from_sources(TomlConfig::default());

        assert_eq!(
            config.uploads_dir(),
            PathBuf::from("/tmp/tirta-config-test/historical")
        );
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/tirta-config-test/tirta.db")
        );
        std::env::remove_var(DATA_FOLDER_ENV);
    }
}
