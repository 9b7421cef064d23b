//! Alert Manager Implementation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum gap between two alerts of any kind (default: 2000ms)
    pub cooldown_ms: u64,
    /// Append-only alert log; `None` keeps alerts in the tracing output only
    pub log_path: Option<PathBuf>,
    /// Play a tone for each alert
    pub sound_enabled: bool,
    /// Tone frequency (Hz)
    pub tone_frequency_hz: f64,
    /// Tone length (milliseconds)
    pub tone_duration_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 2000,
            log_path: Some(PathBuf::from("fatigue_log.txt")),
            sound_enabled: true,
            tone_frequency_hz: 1200.0,
            tone_duration_ms: 300,
        }
    }
}

/// Global debounce shared by every alert kind.
///
/// Alerts inside the cooldown are dropped, never queued.
pub struct AlertManager {
    cooldown: Duration,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: &AlertConfig) -> Self {
        info!("Creating alert manager with {}ms cooldown", config.cooldown_ms);
        Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }

    /// Check whether an alert at `t` clears the cooldown since `last_alert_at`
    pub fn should_fire(&self, last_alert_at: Option<Instant>, t: Instant) -> bool {
        match last_alert_at {
            None => true,
            Some(last) => t.saturating_duration_since(last) > self.cooldown,
        }
    }

    /// Record that an alert was fired
    pub fn record_fire(&self) {
        metrics::counter!("fatigue_alerts_fired_total").increment(1);
    }

    /// Record that an alert was debounced
    pub fn record_suppressed(&self) {
        metrics::counter!("fatigue_alerts_suppressed_total").increment(1);
        debug!("Alert suppressed: in cooldown period");
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(&AlertConfig::default())
    }
}
