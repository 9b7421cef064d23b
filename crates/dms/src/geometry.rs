//! Eye and mouth aspect ratios from facial landmarks
//!
//! All distances are Euclidean on raw pixel coordinates. A degenerate shape
//! (zero horizontal span) yields 0.0 rather than an error; callers that need
//! to tell "no signal" apart from a valid low ratio use [`combined_ear`],
//! which returns `None`.

use serde::{Deserialize, Serialize};

/// Number of points in an eye outline
pub const EYE_POINTS: usize = 6;

/// 2-D pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &LandmarkPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One eye outline in anatomical order: outer corner, upper-outer lid,
/// upper-inner lid, inner corner, lower-inner lid, lower-outer lid.
///
/// Anything other than exactly six points is treated as unavailable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeShape {
    pub points: Vec<LandmarkPoint>,
}

impl EyeShape {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn is_available(&self) -> bool {
        self.points.len() == EYE_POINTS
    }
}

/// Lip pairs (upper[i] sits above lower[i]) plus both mouth corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthShape {
    pub upper: [LandmarkPoint; 2],
    pub lower: [LandmarkPoint; 2],
    pub left: LandmarkPoint,
    pub right: LandmarkPoint,
}

/// Eye aspect ratio: (|p1-p5| + |p2-p4|) / (2 |p0-p3|)
pub fn eye_aspect_ratio(eye: &EyeShape) -> f64 {
    if !eye.is_available() {
        return 0.0;
    }
    let p = &eye.points;
    let a = p[1].distance(&p[5]);
    let b = p[2].distance(&p[4]);
    let c = p[0].distance(&p[3]);
    if c == 0.0 {
        return 0.0;
    }
    (a + b) / (2.0 * c)
}

/// Mouth aspect ratio: mean lip gap over corner-to-corner width
pub fn mouth_aspect_ratio(mouth: &MouthShape) -> f64 {
    let horizontal = mouth.left.distance(&mouth.right);
    if horizontal == 0.0 {
        return 0.0;
    }
    let vertical = mouth
        .upper
        .iter()
        .zip(mouth.lower.iter())
        .map(|(u, l)| u.distance(l))
        .sum::<f64>()
        / mouth.upper.len() as f64;
    vertical / horizontal
}

/// Combine both eyes, tolerating occlusion of one of them.
///
/// Mean when both are positive, otherwise whichever one is positive.
/// `None` only when neither eye gives a usable ratio.
pub fn combined_ear(left: f64, right: f64) -> Option<f64> {
    match (left > 0.0, right > 0.0) {
        (true, true) => Some((left + right) / 2.0),
        (true, false) => Some(left),
        (false, true) => Some(right),
        (false, false) => None,
    }
}
