//! Application configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `FATIGUE__SECTION__KEY` environment variables.

use alerting::AlertConfig;
use camera_capture::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::panel::Settings;
use crate::rate_limit::RateLimitConfig;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "fatigue-monitor";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Prometheus scrape endpoint; disabled when absent
    pub metrics_addr: Option<String>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            metrics_addr: None,
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    /// Recorded landmark trace replayed as the video source
    pub trace_path: PathBuf,
    /// Initial control panel values
    pub detection: Settings,
    pub dms: DmsConfig,
    pub alerts: AlertConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            camera: CameraConfig::default(),
            trace_path: PathBuf::from("landmarks.jsonl"),
            detection: Settings::default(),
            dms: DmsConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the layered configuration.
    ///
    /// An explicit `path` must exist; otherwise `fatigue-monitor.toml` is
    /// used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("FATIGUE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
