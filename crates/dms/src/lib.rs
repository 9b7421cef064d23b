//! Driver Monitoring System (DMS)
//!
//! Real-time fatigue inference from facial landmarks:
//! - Eye aspect ratio (EAR) and mouth aspect ratio (MAR)
//! - EAR smoothing across a short frame window
//! - Context-sensitive eye-closure allowance (speed, weather, time of day)
//! - Drowsiness and yawn state machine
//! - Open-eye baseline calibration

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod detector;
pub mod geometry;
pub mod smoothing;
pub mod state;
pub mod threshold;

pub use analysis::{FatigueAlert, FatigueStatus, FrameAnalysis, FrameSnapshot};
pub use calibration::{CalibrationError, CalibrationResult, Calibrator};
pub use config::DmsConfig;
pub use detector::{FaceLandmarks, LandmarkProvider, TraceProvider};
pub use geometry::{combined_ear, eye_aspect_ratio, mouth_aspect_ratio};
pub use state::FatigueSession;
pub use threshold::{closure_threshold, ThresholdContext, TimePeriod, Weather};

use ring_buffer::{RingBuffer, TimedSample};
use smoothing::SmoothedSignal;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Combined EAR of one face, `None` when neither eye is usable
pub fn face_ear(face: &FaceLandmarks) -> Option<f64> {
    combined_ear(
        eye_aspect_ratio(&face.left_eye()),
        eye_aspect_ratio(&face.right_eye()),
    )
}

/// Fatigue inference for one monitoring session
pub struct DmsModule {
    config: DmsConfig,
    smoother: SmoothedSignal,
    session: FatigueSession,
    ear_history: RingBuffer<TimedSample>,
    mar_history: RingBuffer<TimedSample>,
    started_at: Option<Instant>,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            smoother: SmoothedSignal::new(config.smoothing_window),
            session: FatigueSession::new(&config),
            ear_history: RingBuffer::new(config.history_len),
            mar_history: RingBuffer::new(config.history_len),
            started_at: None,
            config,
        })
    }

    /// Begin a fresh session at `t`
    pub fn start(&mut self, t: Instant) {
        self.reset_state();
        self.started_at = Some(t);
        info!(
            "Fatigue session started (EAR cutoff {:.3}, MAR cutoff {:.3})",
            self.session.ear_threshold, self.session.mar_threshold
        );
    }

    /// Apply the cutoffs currently set on the control panel
    pub fn set_thresholds(&mut self, ear_threshold: f64, mar_threshold: f64) -> Result<(), DmsError> {
        let candidate = DmsConfig {
            ear_threshold,
            mar_threshold,
            ..self.config.clone()
        };
        candidate.validate()?;
        self.config = candidate;
        self.session.ear_threshold = ear_threshold;
        self.session.mar_threshold = mar_threshold;
        Ok(())
    }

    /// Analyze one frame's landmarks (`None` = no face found)
    pub fn analyze(
        &mut self,
        face: Option<&FaceLandmarks>,
        ctx: &ThresholdContext,
        t: Instant,
    ) -> FrameAnalysis {
        let raw_ear = face.and_then(face_ear);
        let mar = face
            .and_then(FaceLandmarks::mouth)
            .map(|mouth| mouth_aspect_ratio(&mouth));

        self.analyze_ratios(raw_ear, mar, ctx, t)
    }

    /// Analyze already-computed ratios
    pub fn analyze_ratios(
        &mut self,
        raw_ear: Option<f64>,
        mar: Option<f64>,
        ctx: &ThresholdContext,
        t: Instant,
    ) -> FrameAnalysis {
        let smoothed = self.smoother.update(raw_ear);
        let offset_ms = self.offset_ms(t);

        metrics::counter!("dms_frames_total").increment(1);
        match smoothed {
            Some(ear) => {
                self.ear_history.push(TimedSample { offset_ms, value: ear });
                metrics::gauge!("dms_ear").set(ear);
            }
            None => metrics::counter!("dms_no_face_frames_total").increment(1),
        }
        if let Some(m) = mar {
            self.mar_history.push(TimedSample { offset_ms, value: m });
            metrics::gauge!("dms_mar").set(m);
        }

        let analysis = self
            .session
            .update(smoothed, mar, closure_threshold(ctx), t);

        if analysis.has_alerts() {
            debug!("Frame raised {:?} ({})", analysis.alerts, analysis.status.text());
        }
        analysis
    }

    /// Read-only view of the session after a frame
    pub fn snapshot(&self, analysis: &FrameAnalysis, ctx: &ThresholdContext, t: Instant) -> FrameSnapshot {
        let closure = closure_threshold(ctx);
        FrameSnapshot {
            ear: analysis.ear,
            mar: analysis.mar,
            status: Some(analysis.status),
            status_text: analysis.status.text(),
            total_alerts: self.session.total_alerts,
            ear_threshold: self.session.ear_threshold,
            mar_threshold: self.session.mar_threshold,
            closure_threshold_s: closure.is_finite().then_some(closure),
            session_duration_ms: self.offset_ms(t),
            ear_history: self.ear_history.to_vec(),
            mar_history: self.mar_history.to_vec(),
        }
    }

    pub fn session(&self) -> &FatigueSession {
        &self.session
    }

    /// Mutable access for the alert dispatcher
    pub fn session_mut(&mut self) -> &mut FatigueSession {
        &mut self.session
    }

    /// Reset driver state (on stop or restart)
    pub fn reset_state(&mut self) {
        self.session.reset();
        self.smoother.clear();
        self.ear_history.clear();
        self.mar_history.clear();
        self.started_at = None;
    }

    fn offset_ms(&self, t: Instant) -> u64 {
        self.started_at
            .map(|s| t.saturating_duration_since(s).as_millis() as u64)
            .unwrap_or(0)
    }
}
