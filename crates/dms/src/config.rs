//! DMS configuration

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::DmsError;

/// Allowed EAR cutoff range
pub const EAR_THRESHOLD_RANGE: RangeInclusive<f64> = 0.15..=0.35;
/// Allowed MAR cutoff range
pub const MAR_THRESHOLD_RANGE: RangeInclusive<f64> = 0.5..=0.8;

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Smoothed EAR below this counts as eyes closing
    pub ear_threshold: f64,

    /// MAR above this counts as mouth wide open
    pub mar_threshold: f64,

    /// Mouth must stay open longer than this to count as a yawn (milliseconds)
    pub yawn_threshold_ms: u64,

    /// EAR smoothing window (frames)
    pub smoothing_window: usize,

    /// Telemetry history length (frames)
    pub history_len: usize,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            mar_threshold: 0.65,
            yawn_threshold_ms: 1000,
            smoothing_window: 3,
            history_len: 100,
        }
    }
}

impl DmsConfig {
    /// Reject cutoffs outside the allowed ranges
    pub fn validate(&self) -> Result<(), DmsError> {
        check_range("ear_threshold", self.ear_threshold, &EAR_THRESHOLD_RANGE)?;
        check_range("mar_threshold", self.mar_threshold, &MAR_THRESHOLD_RANGE)?;
        if self.smoothing_window == 0 {
            return Err(DmsError::Config("smoothing_window must be at least 1".into()));
        }
        Ok(())
    }
}

fn check_range(field: &str, value: f64, range: &RangeInclusive<f64>) -> Result<(), DmsError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DmsError::Config(format!(
            "{} {} is outside [{}, {}]",
            field,
            value,
            range.start(),
            range.end()
        )))
    }
}

/// Clamp a slider-style value into its allowed range
pub fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    value.clamp(*range.start(), *range.end())
}
