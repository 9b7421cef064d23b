//! Landmark provider seam and face-mesh index mapping

use camera_capture::frame::VideoFrame;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::geometry::{EyeShape, LandmarkPoint, MouthShape};
use crate::DmsError;

/// Face-mesh indices of the left eye outline, in anatomical order
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
/// Face-mesh indices of the right eye outline, in anatomical order
pub const RIGHT_EYE: [usize; 6] = [263, 387, 385, 362, 380, 373];
pub const UPPER_LIP: [usize; 2] = [13, 14];
pub const LOWER_LIP: [usize; 2] = [17, 18];
pub const LEFT_MOUTH: usize = 78;
pub const RIGHT_MOUTH: usize = 308;

/// One face's landmark superset, in pixel coordinates
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<LandmarkPoint>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    /// Scale normalized `[0, 1]` coordinates to whole pixels of a `width`x`height` frame
    pub fn from_normalized(normalized: &[(f64, f64)], width: u32, height: u32) -> Self {
        let points = normalized
            .iter()
            .map(|&(x, y)| {
                LandmarkPoint::new((x * width as f64).trunc(), (y * height as f64).trunc())
            })
            .collect();
        Self { points }
    }

    fn eye(&self, indices: &[usize; 6]) -> EyeShape {
        // A missing index leaves fewer than six points, i.e. unavailable
        EyeShape::new(indices.iter().filter_map(|&i| self.points.get(i).copied()).collect())
    }

    pub fn left_eye(&self) -> EyeShape {
        self.eye(&LEFT_EYE)
    }

    pub fn right_eye(&self) -> EyeShape {
        self.eye(&RIGHT_EYE)
    }

    /// `None` when the landmark set is too small to hold the mouth indices
    pub fn mouth(&self) -> Option<MouthShape> {
        let p = |i: usize| self.points.get(i).copied();
        Some(MouthShape {
            upper: [p(UPPER_LIP[0])?, p(UPPER_LIP[1])?],
            lower: [p(LOWER_LIP[0])?, p(LOWER_LIP[1])?],
            left: p(LEFT_MOUTH)?,
            right: p(RIGHT_MOUTH)?,
        })
    }
}

/// External face-landmark detector.
///
/// Called once per frame at the loop's cadence. Returns `Ok(None)` when no
/// face is visible; that is not an error.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError>;

    /// Release the model handle
    fn close(&mut self) {}
}

/// Replays a recorded landmark trace instead of running a detector.
///
/// The trace is JSON lines, one per frame: `null` for no face, or an array
/// of normalized `[x, y]` pairs. Frames are matched by sequence number,
/// wrapping around so a looping clip replays the trace.
#[derive(Debug, Clone)]
pub struct TraceProvider {
    entries: Vec<Option<Vec<(f64, f64)>>>,
}

impl TraceProvider {
    pub fn new(entries: Vec<Option<Vec<(f64, f64)>>>) -> Result<Self, DmsError> {
        if entries.is_empty() {
            return Err(DmsError::ModelLoad("landmark trace is empty".into()));
        }
        Ok(Self { entries })
    }

    /// Load a trace file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        info!("Loading landmark trace from {}", path.display());

        let file = File::open(path)
            .map_err(|e| DmsError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| DmsError::ModelLoad(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: Option<Vec<(f64, f64)>> = serde_json::from_str(&line)
                .map_err(|e| DmsError::ModelLoad(format!("line {}: {}", n + 1, e)))?;
            entries.push(entry);
        }

        debug!("Trace holds {} frames", entries.len());
        Self::new(entries)
    }

    /// Number of recorded frames
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LandmarkProvider for TraceProvider {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
        let index = frame.sequence as usize % self.entries.len();
        Ok(self.entries[index]
            .as_deref()
            .map(|points| FaceLandmarks::from_normalized(points, frame.width, frame.height)))
    }
}
