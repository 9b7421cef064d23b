//! Camera Capture Library for Driver Monitoring
//!
//! Provides the frame-source seam consumed by the fatigue loop:
//! - Live cabin camera (backend supplied by the host platform)
//! - Finite clip playback, optionally looping back to the first frame
//! - Resizing to the working resolution before landmark lookup

pub mod frame;
pub mod source;

pub use frame::VideoFrame;
pub use source::{ClipSource, FrameRead, FrameSource};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Source does not support rewinding")]
    RewindUnsupported,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Cabin-facing camera; a hard read failure ends the session
    #[default]
    Live,
    /// Recorded clip; end-of-stream either rewinds or ends the session
    Playback { looping: bool },
}

impl CaptureMode {
    /// Whether end-of-stream should seek back to the first frame
    pub fn loops(&self) -> bool {
        matches!(self, CaptureMode::Playback { looping: true })
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Working width frames are resized to
    pub width: u32,
    /// Working height frames are resized to
    pub height: u32,
    /// Target FPS (drives the fixed inter-frame delay)
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CameraConfig {
    /// Fixed delay between frames; drift is acceptable
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}
