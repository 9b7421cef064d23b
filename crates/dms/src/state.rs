//! Fatigue session state machine

use std::time::{Duration, Instant};
use tracing::debug;

use crate::analysis::{FatigueAlert, FatigueStatus, FrameAnalysis};
use crate::config::DmsConfig;

/// Mutable per-run state, owned by the detection loop.
///
/// Created at start, reset on stop; nothing survives a stop/start boundary.
#[derive(Debug, Clone)]
pub struct FatigueSession {
    /// When the smoothed EAR first dropped below the cutoff
    pub eyes_closed_since: Option<Instant>,

    /// When the MAR first rose above the cutoff
    pub yawn_since: Option<Instant>,

    /// Frames in a row spent past the closure allowance (decays by one per open frame)
    pub consecutive_drowsy: u32,

    /// Alerts that passed the rate limiter
    pub total_alerts: u32,

    /// Last alert that passed the rate limiter
    pub last_alert_at: Option<Instant>,

    pub ear_threshold: f64,

    pub mar_threshold: f64,

    yawn_threshold: Duration,
}

impl FatigueSession {
    pub fn new(config: &DmsConfig) -> Self {
        Self {
            eyes_closed_since: None,
            yawn_since: None,
            consecutive_drowsy: 0,
            total_alerts: 0,
            last_alert_at: None,
            ear_threshold: config.ear_threshold,
            mar_threshold: config.mar_threshold,
            yawn_threshold: Duration::from_millis(config.yawn_threshold_ms),
        }
    }

    /// Clear timers and counters; cutoffs are kept
    pub fn reset(&mut self) {
        self.eyes_closed_since = None;
        self.yawn_since = None;
        self.consecutive_drowsy = 0;
        self.total_alerts = 0;
        self.last_alert_at = None;
    }

    /// Advance the state machine by one frame.
    ///
    /// `closure_threshold_s` may be infinite, in which case eye closure never
    /// raises an alert.
    pub fn update(
        &mut self,
        smoothed_ear: Option<f64>,
        mar: Option<f64>,
        closure_threshold_s: f64,
        t: Instant,
    ) -> FrameAnalysis {
        let mut alerts = Vec::new();

        let eye_status = match smoothed_ear {
            None => {
                // Losing the face is not eyes-closed; restart the timer on return
                self.eyes_closed_since = None;
                self.consecutive_drowsy = 0;
                FatigueStatus::NoFace
            }
            Some(ear) if ear < self.ear_threshold => {
                let since = *self.eyes_closed_since.get_or_insert(t);
                let elapsed = t.saturating_duration_since(since);
                let elapsed_ms = elapsed.as_millis() as u64;

                if elapsed.as_secs_f64() > closure_threshold_s {
                    self.consecutive_drowsy += 1;
                    alerts.push(FatigueAlert::Drowsiness);
                    debug!(
                        "Eyes closed {:.2}s past {:.2}s allowance (streak {})",
                        elapsed.as_secs_f64(),
                        closure_threshold_s,
                        self.consecutive_drowsy
                    );
                    FatigueStatus::Drowsy { elapsed_ms }
                } else {
                    FatigueStatus::Closing { elapsed_ms }
                }
            }
            Some(_) => {
                self.eyes_closed_since = None;
                self.consecutive_drowsy = self.consecutive_drowsy.saturating_sub(1);
                FatigueStatus::Attentive
            }
        };

        // Mouth is only judged while the eyes are tracked
        let yawning = match mar.filter(|_| smoothed_ear.is_some()) {
            Some(m) if m > self.mar_threshold => {
                let since = *self.yawn_since.get_or_insert(t);
                t.saturating_duration_since(since) > self.yawn_threshold
            }
            _ => {
                self.yawn_since = None;
                false
            }
        };
        if yawning {
            alerts.push(FatigueAlert::Yawning);
        }

        let status = match eye_status {
            FatigueStatus::NoFace => FatigueStatus::NoFace,
            _ if yawning => FatigueStatus::Yawning,
            other => other,
        };

        FrameAnalysis {
            ear: smoothed_ear,
            mar,
            status,
            alerts,
        }
    }
}

impl Default for FatigueSession {
    fn default() -> Self {
        Self::new(&DmsConfig::default())
    }
}
