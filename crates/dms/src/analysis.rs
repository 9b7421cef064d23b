//! Per-frame analysis results and read-only snapshots

use ring_buffer::TimedSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatigue alert kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatigueAlert {
    /// Eyes closed longer than the context allowance
    Drowsiness,

    /// Mouth held wide open longer than the yawn allowance
    Yawning,
}

impl fmt::Display for FatigueAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FatigueAlert::Drowsiness => "DROWSINESS",
            FatigueAlert::Yawning => "YAWNING",
        })
    }
}

/// Display status, in decreasing priority
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FatigueStatus {
    /// No usable eye signal this frame
    NoFace,
    /// Yawn alert raised this frame
    Yawning,
    /// Drowsiness alert raised this frame
    Drowsy { elapsed_ms: u64 },
    /// Eyes below cutoff but still within the allowance
    Closing { elapsed_ms: u64 },
    Attentive,
}

impl FatigueStatus {
    /// Status line shown to the driver
    pub fn text(&self) -> String {
        match self {
            FatigueStatus::NoFace => "NO FACE DETECTED".to_string(),
            FatigueStatus::Yawning => "YAWNING DETECTED".to_string(),
            FatigueStatus::Drowsy { elapsed_ms } => {
                format!("DROWSINESS ALERT ({:.1}s)", *elapsed_ms as f64 / 1000.0)
            }
            FatigueStatus::Closing { elapsed_ms } => {
                format!("Eyes Closing... ({:.1}s)", *elapsed_ms as f64 / 1000.0)
            }
            FatigueStatus::Attentive => "ATTENTIVE".to_string(),
        }
    }
}

/// Result of one state-machine step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Smoothed combined EAR (`None` = no signal)
    pub ear: Option<f64>,

    /// Mouth aspect ratio (`None` = no face)
    pub mar: Option<f64>,

    pub status: FatigueStatus,

    /// Alerts raised this frame, before rate limiting
    pub alerts: Vec<FatigueAlert>,
}

impl FrameAnalysis {
    /// Check if any alerts are raised
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// Immutable view published after every frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub ear: Option<f64>,
    pub mar: Option<f64>,
    pub status: Option<FatigueStatus>,
    pub status_text: String,
    pub total_alerts: u32,
    pub ear_threshold: f64,
    pub mar_threshold: f64,
    /// `None` while the allowance is unbounded (vehicle parked)
    pub closure_threshold_s: Option<f64>,
    pub session_duration_ms: u64,
    pub ear_history: Vec<TimedSample>,
    pub mar_history: Vec<TimedSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(FatigueStatus::Attentive.text(), "ATTENTIVE");
        assert_eq!(FatigueStatus::NoFace.text(), "NO FACE DETECTED");
        assert_eq!(
            FatigueStatus::Closing { elapsed_ms: 1240 }.text(),
            "Eyes Closing... (1.2s)"
        );
        assert_eq!(
            FatigueStatus::Drowsy { elapsed_ms: 2100 }.text(),
            "DROWSINESS ALERT (2.1s)"
        );
    }
}
