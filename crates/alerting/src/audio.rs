//! Alert tones and audio sinks

use std::f64::consts::PI;
use std::io::Write;
use std::time::Duration;
use tracing::debug;

use crate::AlertError;

/// Output sample rate for rendered tones
pub const SAMPLE_RATE: u32 = 44_100;

/// A short beep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration: Duration,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency_hz: 1200.0,
            duration: Duration::from_millis(300),
        }
    }
}

/// Render a tone to mono 16-bit PCM with an `exp(-3t)` decay envelope
pub fn render_tone(tone: &Tone, sample_rate: u32) -> Vec<i16> {
    let count = (sample_rate as f64 * tone.duration.as_secs_f64()).round() as usize;
    (0..count)
        .map(|n| {
            let t = n as f64 / sample_rate as f64;
            let wave = (2.0 * PI * tone.frequency_hz * t).sin() * (-3.0 * t).exp();
            (wave * i16::MAX as f64) as i16
        })
        .collect()
}

/// Audio output collaborator.
///
/// Errors are reported to the dispatcher, which logs them and carries on.
pub trait AudioSink: Send {
    fn play(&mut self, tone: &Tone) -> Result<(), AlertError>;
}

/// Rings the terminal bell on stderr
#[derive(Debug, Default)]
pub struct TerminalBellSink;

impl AudioSink for TerminalBellSink {
    fn play(&mut self, tone: &Tone) -> Result<(), AlertError> {
        debug!("Bell for {:.0}Hz tone", tone.frequency_hz);
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| AlertError::Audio(e.to_string()))
    }
}

/// Renders every requested tone into an in-memory PCM buffer
#[derive(Debug, Default)]
pub struct PcmBufferSink {
    samples: Vec<i16>,
    played: usize,
}

impl PcmBufferSink {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of tones rendered so far
    pub fn played(&self) -> usize {
        self.played
    }
}

impl AudioSink for PcmBufferSink {
    fn play(&mut self, tone: &Tone) -> Result<(), AlertError> {
        self.samples.extend(render_tone(tone, SAMPLE_RATE));
        self.played += 1;
        Ok(())
    }
}
