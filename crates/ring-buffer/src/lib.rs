//! Fixed-Capacity Ring Buffer
//!
//! Provides the sliding windows used by the fatigue loop: the 3-frame EAR
//! smoothing window and the 100-sample telemetry history.

mod buffer;

pub use buffer::RingBuffer;

use serde::{Deserialize, Serialize};

/// A value stamped with its offset from the start of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedSample {
    pub offset_ms: u64,
    pub value: f64,
}
