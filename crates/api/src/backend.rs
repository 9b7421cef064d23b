//! Capture backends: where frames, landmarks and sound come from

use alerting::{AudioSink, TerminalBellSink};
use camera_capture::{CameraConfig, CameraError, CaptureMode, ClipSource, FrameSource};
use dms::{DmsError, LandmarkProvider, TraceProvider};
use std::path::Path;
use tracing::info;

/// Acquires the scoped resources of one monitoring or calibration run
pub trait CaptureBackend: Send + Sync {
    /// Open the video source; `loop_playback` only matters for finite sources
    fn open_source(
        &self,
        loop_playback: bool,
    ) -> Result<(Box<dyn FrameSource>, CaptureMode), CameraError>;

    /// Load the landmark detector
    fn open_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, DmsError>;

    fn audio_sink(&self) -> Box<dyn AudioSink>;
}

/// Replays a recorded landmark trace as a finite clip
pub struct ReplayBackend {
    trace: TraceProvider,
    camera: CameraConfig,
}

impl ReplayBackend {
    pub fn open(trace_path: &Path, camera: CameraConfig) -> Result<Self, DmsError> {
        let trace = TraceProvider::open(trace_path)?;
        info!("Replay backend ready with {} recorded frames", trace.len());
        Ok(Self { trace, camera })
    }

    pub fn from_trace(trace: TraceProvider, camera: CameraConfig) -> Self {
        Self { trace, camera }
    }
}

impl CaptureBackend for ReplayBackend {
    fn open_source(
        &self,
        loop_playback: bool,
    ) -> Result<(Box<dyn FrameSource>, CaptureMode), CameraError> {
        let clip = ClipSource::blank(self.trace.len(), self.camera.width, self.camera.height)?;
        Ok((
            Box::new(clip),
            CaptureMode::Playback {
                looping: loop_playback,
            },
        ))
    }

    fn open_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, DmsError> {
        Ok(Box::new(self.trace.clone()))
    }

    fn audio_sink(&self) -> Box<dyn AudioSink> {
        Box::new(TerminalBellSink)
    }
}
