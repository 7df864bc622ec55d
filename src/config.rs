//! Configuration management for Auriga
//!
//! This module handles loading, validation, and management of the crate
//! configuration from YAML files.

use crate::error::{AurigaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Owner API connection configuration
    pub tesla: TeslaConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Path where refreshed tokens are persisted
    pub settings_file: String,

    /// Suggested polling cadence for the external coordinator, milliseconds
    pub poll_interval_ms: u64,
}

/// Owner API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeslaConfig {
    /// Base URL of the vehicle cloud service
    pub base_url: String,

    /// OAuth client ID for the token endpoint
    pub client_id: String,

    /// OAuth client secret for the token endpoint
    pub client_secret: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Minutes to disable the API after a non-transient error
    pub error_retry_mins: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level override
    pub console_level: Option<String>,

    /// Optional file-specific level override
    pub file_level: Option<String>,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for TeslaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://owner-api.teslamotors.com".to_string(),
            // Public owner-API client pair, unchanged since the Model S era
            client_id: "81527cff06843c8634fdc09e8ac0abefb46ac849f38fe1e431c2ef2106796384"
                .to_string(),
            client_secret: "c7257eb71a564034f9419ee651c7d0e5f7aa6bfbd18bafb5c5c033b093bb2fa3"
                .to_string(),
            timeout_secs: 60,
            error_retry_mins: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/auriga.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tesla: TeslaConfig::default(),
            logging: LoggingConfig::default(),
            settings_file: "/data/auriga_settings.json".to_string(),
            poll_interval_ms: 5000,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with validation
    pub fn load() -> Result<Self> {
        // Try to load from default locations
        let default_paths = [
            "auriga_config.yaml",
            "/data/auriga_config.yaml",
            "/etc/auriga/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tesla.base_url.is_empty() {
            return Err(AurigaError::validation(
                "tesla.base_url",
                "Base URL cannot be empty",
            ));
        }

        if self.tesla.client_id.is_empty() {
            return Err(AurigaError::validation(
                "tesla.client_id",
                "Client ID cannot be empty",
            ));
        }

        if self.tesla.client_secret.is_empty() {
            return Err(AurigaError::validation(
                "tesla.client_secret",
                "Client secret cannot be empty",
            ));
        }

        if self.tesla.timeout_secs == 0 {
            return Err(AurigaError::validation(
                "tesla.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.tesla.error_retry_mins == 0 {
            return Err(AurigaError::validation(
                "tesla.error_retry_mins",
                "Must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(AurigaError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
