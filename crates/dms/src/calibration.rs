//! Open-eye baseline calibration
//!
//! Samples the combined EAR for a short window while the driver keeps their
//! eyes wide open, trims outliers and derives a personal alert cutoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sampling window length
pub const CALIBRATION_WINDOW: Duration = Duration::from_secs(3);
/// Readings at or below this are discarded as detection glitches
pub const MIN_VALID_EAR: f64 = 0.1;
/// Minimum retained readings for a usable baseline
pub const MIN_SAMPLES: usize = 10;
/// Alert once the eye closes to this fraction of its open ratio
pub const OPEN_EAR_FRACTION: f64 = 0.65;
/// Lowest cutoff calibration may produce
pub const THRESHOLD_FLOOR: f64 = 0.18;

/// Calibration failure; no configuration is touched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Face not detected clearly: {collected} usable samples, need {required}")]
    InsufficientSamples { collected: usize, required: usize },

    #[error("Calibration refused while monitoring is active")]
    MonitoringActive,
}

/// Outcome of a successful calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Trimmed mean of the open-eye readings
    pub base_open_ear: f64,
    /// Derived EAR cutoff
    pub ear_threshold: f64,
    /// Readings kept after the validity filter (before trimming)
    pub samples: usize,
}

/// Accumulates readings over one calibration window
#[derive(Debug, Default)]
pub struct Calibrator {
    samples: Vec<f64>,
    rejected: usize,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame's combined EAR (`None` when no face was found)
    pub fn add_sample(&mut self, ear: Option<f64>) {
        match ear {
            Some(v) if v > MIN_VALID_EAR => self.samples.push(v),
            _ => self.rejected += 1,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Consume the window and derive the cutoff
    pub fn finish(self) -> Result<CalibrationResult, CalibrationError> {
        debug!(
            "Calibration window closed: {} kept, {} rejected",
            self.samples.len(),
            self.rejected
        );
        calibrate_from_samples(&self.samples)
    }
}

/// Derive a cutoff from already-filtered open-eye readings.
///
/// The lower `n / 4` and upper `ceil(n / 4)` readings are dropped before
/// averaging.
pub fn calibrate_from_samples(samples: &[f64]) -> Result<CalibrationResult, CalibrationError> {
    if samples.len() < MIN_SAMPLES {
        warn!("Calibration failed: only {} usable samples", samples.len());
        return Err(CalibrationError::InsufficientSamples {
            collected: samples.len(),
            required: MIN_SAMPLES,
        });
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let low = n / 4;
    let high = n - n.div_ceil(4);
    let kept = &sorted[low..high];

    let base_open_ear = kept.iter().sum::<f64>() / kept.len() as f64;
    let ear_threshold = (base_open_ear * OPEN_EAR_FRACTION).max(THRESHOLD_FLOOR);

    info!(
        "Calibration complete: open-eye EAR {:.3}, alert threshold {:.3}",
        base_open_ear, ear_threshold
    );

    Ok(CalibrationResult {
        base_open_ear,
        ear_threshold,
        samples: n,
    })
}
