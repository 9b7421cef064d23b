//! Alerting System
//!
//! Turns fatigue alerts raised by the state machine into user-visible
//! effects: a rate-limited counter, one log line and one audible tone per
//! alert that passes the limiter.

mod audio;
mod dispatcher;
mod log;
mod manager;

pub use audio::{render_tone, AudioSink, PcmBufferSink, TerminalBellSink, Tone};
pub use dispatcher::AlertDispatcher;
pub use log::{AlertLog, AlertRecord};
pub use manager::{AlertConfig, AlertManager};

use thiserror::Error;

/// Alerting errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert log write failed: {0}")]
    Log(#[from] std::io::Error),

    #[error("Audio playback failed: {0}")]
    Audio(String),
}
