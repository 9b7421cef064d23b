//! Control panel settings
//!
//! Every value here may change at any time; the detection loop reads a fresh
//! copy once per frame.

use dms::config::{clamp_to, EAR_THRESHOLD_RANGE, MAR_THRESHOLD_RANGE};
use dms::{ThresholdContext, TimePeriod, Weather};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Speed slider range (km/h)
pub const SPEED_RANGE: RangeInclusive<f64> = 0.0..=120.0;

/// Current control panel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub speed_kmh: f64,
    pub weather: Weather,
    pub time_period: TimePeriod,
    pub ear_threshold: f64,
    pub mar_threshold: f64,
    /// Rewind the demo clip at end-of-stream instead of stopping
    pub loop_playback: bool,
    pub sound_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speed_kmh: 60.0,
            weather: Weather::Clear,
            time_period: TimePeriod::Day,
            ear_threshold: 0.25,
            mar_threshold: 0.65,
            loop_playback: false,
            sound_enabled: true,
        }
    }
}

impl Settings {
    /// Driving context for the threshold policy
    pub fn context(&self) -> ThresholdContext {
        ThresholdContext {
            speed_kmh: self.speed_kmh,
            weather: self.weather,
            time_period: self.time_period,
        }
    }

    /// Force every slider back into its range
    pub fn clamped(mut self) -> Self {
        self.speed_kmh = clamp_to(self.speed_kmh, &SPEED_RANGE);
        self.ear_threshold = clamp_to(self.ear_threshold, &EAR_THRESHOLD_RANGE);
        self.mar_threshold = clamp_to(self.mar_threshold, &MAR_THRESHOLD_RANGE);
        self
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub speed_kmh: Option<f64>,
    pub weather: Option<Weather>,
    pub time_period: Option<TimePeriod>,
    pub ear_threshold: Option<f64>,
    pub mar_threshold: Option<f64>,
    pub loop_playback: Option<bool>,
    pub sound_enabled: Option<bool>,
}

/// Shared handle to the panel
#[derive(Debug, Clone, Default)]
pub struct ControlPanel {
    inner: Arc<RwLock<Settings>>,
}

impl ControlPanel {
    pub fn new(initial: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.clamped())),
        }
    }

    /// Copy of the current values
    pub async fn get(&self) -> Settings {
        self.inner.read().await.clone()
    }

    /// Apply a patch, clamping into range, and return the result
    pub async fn update(&self, patch: SettingsPatch) -> Settings {
        let mut settings = self.inner.write().await;
        let mut next = settings.clone();

        if let Some(v) = patch.speed_kmh {
            next.speed_kmh = v;
        }
        if let Some(v) = patch.weather {
            next.weather = v;
        }
        if let Some(v) = patch.time_period {
            next.time_period = v;
        }
        if let Some(v) = patch.ear_threshold {
            next.ear_threshold = v;
        }
        if let Some(v) = patch.mar_threshold {
            next.mar_threshold = v;
        }
        if let Some(v) = patch.loop_playback {
            next.loop_playback = v;
        }
        if let Some(v) = patch.sound_enabled {
            next.sound_enabled = v;
        }

        *settings = next.clamped();
        info!("Control panel updated: {:?}", *settings);
        settings.clone()
    }

    /// Install a calibrated EAR cutoff
    pub async fn set_ear_threshold(&self, ear_threshold: f64) -> f64 {
        let mut settings = self.inner.write().await;
        settings.ear_threshold = clamp_to(ear_threshold, &EAR_THRESHOLD_RANGE);
        settings.ear_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_patch_clamps() {
        let panel = ControlPanel::default();
        let updated = panel
            .update(SettingsPatch {
                speed_kmh: Some(200.0),
                ear_threshold: Some(0.05),
                weather: Some(Weather::Fog),
                ..Default::default()
            })
            .await;

        assert_eq!(updated.speed_kmh, 120.0);
        assert_eq!(updated.ear_threshold, 0.15);
        assert_eq!(updated.weather, Weather::Fog);
        assert_eq!(updated.mar_threshold, 0.65);
        assert_eq!(panel.get().await, updated);
    }

    #[tokio::test]
    async fn test_calibrated_threshold() {
        let panel = ControlPanel::default();
        assert_eq!(panel.set_ear_threshold(0.21).await, 0.21);
        assert_eq!(panel.get().await.ear_threshold, 0.21);
    }

    #[test]
    fn test_context() {
        let settings = Settings {
            speed_kmh: 90.0,
            time_period: TimePeriod::Night,
            ..Default::default()
        };
        let ctx = settings.context();
        assert_eq!(ctx.speed_kmh, 90.0);
        assert_eq!(ctx.time_period, TimePeriod::Night);
    }
}
