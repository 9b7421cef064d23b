//! Alert dispatch

use chrono::Local;
use dms::{FatigueSession, FrameAnalysis, ThresholdContext};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::audio::{AudioSink, Tone};
use crate::log::{AlertLog, AlertRecord};
use crate::manager::{AlertConfig, AlertManager};

/// Routes raised alerts through the rate limiter to the log and audio sink
pub struct AlertDispatcher {
    manager: AlertManager,
    log: AlertLog,
    audio: Box<dyn AudioSink>,
    tone: Tone,
    sound_enabled: bool,
}

impl AlertDispatcher {
    pub fn new(config: &AlertConfig, audio: Box<dyn AudioSink>) -> Self {
        Self {
            manager: AlertManager::new(config),
            log: AlertLog::new(config.log_path.clone()),
            audio,
            tone: Tone {
                frequency_hz: config.tone_frequency_hz,
                duration: Duration::from_millis(config.tone_duration_ms),
            },
            sound_enabled: config.sound_enabled,
        }
    }

    /// Toggle the audible tone; alerts are still counted and logged
    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
    }

    /// Dispatch every alert raised this frame.
    ///
    /// Each alert kind goes through the same global cooldown in turn, so a
    /// second alert in the same frame is suppressed by the first. Returns
    /// the alerts that fired.
    pub fn dispatch(
        &mut self,
        session: &mut FatigueSession,
        analysis: &FrameAnalysis,
        ctx: &ThresholdContext,
        t: Instant,
    ) -> Vec<AlertRecord> {
        let mut fired = Vec::new();

        for &kind in &analysis.alerts {
            if !self.manager.should_fire(session.last_alert_at, t) {
                self.manager.record_suppressed();
                continue;
            }

            session.total_alerts += 1;
            session.last_alert_at = Some(t);
            self.manager.record_fire();

            let record = AlertRecord {
                timestamp: Local::now(),
                index: session.total_alerts,
                kind,
                ear: analysis.ear,
                mar: analysis.mar,
                speed_kmh: ctx.speed_kmh,
                weather: ctx.weather,
                time_period: ctx.time_period,
            };

            if let Err(e) = self.log.append(&record) {
                warn!("Failed to persist alert #{}: {}", record.index, e);
            }

            if self.sound_enabled {
                if let Err(e) = self.audio.play(&self.tone) {
                    warn!("Alert tone failed, continuing without sound: {}", e);
                }
            }

            info!("{} ALERT! Wake up! (#{})", kind, record.index);
            fired.push(record);
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmBufferSink;
    use crate::AlertError;
    use dms::{FatigueAlert, FatigueStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts plays through a shared handle
    struct CountingSink(Arc<AtomicUsize>);

    impl AudioSink for CountingSink {
        fn play(&mut self, _tone: &Tone) -> Result<(), AlertError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn play(&mut self, _tone: &Tone) -> Result<(), AlertError> {
            Err(AlertError::Audio("no output device".into()))
        }
    }

    fn quiet_config() -> AlertConfig {
        AlertConfig {
            log_path: None,
            ..Default::default()
        }
    }

    fn drowsy_frame() -> FrameAnalysis {
        FrameAnalysis {
            ear: Some(0.15),
            mar: Some(0.3),
            status: FatigueStatus::Drowsy { elapsed_ms: 2100 },
            alerts: vec![FatigueAlert::Drowsiness],
        }
    }

    #[test]
    fn test_rate_limited_dispatch() {
        let plays = Arc::new(AtomicUsize::new(0));
        let mut dispatcher =
            AlertDispatcher::new(&quiet_config(), Box::new(CountingSink(plays.clone())));
        let mut session = FatigueSession::default();
        let ctx = ThresholdContext::default();
        let t0 = Instant::now();

        let first = dispatcher.dispatch(&mut session, &drowsy_frame(), &ctx, t0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].index, 1);

        let during = dispatcher.dispatch(
            &mut session,
            &drowsy_frame(),
            &ctx,
            t0 + Duration::from_millis(1500),
        );
        assert!(during.is_empty());
        assert_eq!(session.total_alerts, 1);

        let after = dispatcher.dispatch(
            &mut session,
            &drowsy_frame(),
            &ctx,
            t0 + Duration::from_millis(2100),
        );
        assert_eq!(after.len(), 1);
        assert_eq!(session.total_alerts, 2);
        assert_eq!(plays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_simultaneous_alerts_share_cooldown() {
        let mut dispatcher = AlertDispatcher::new(&quiet_config(), Box::new(PcmBufferSink::default()));
        let mut session = FatigueSession::default();
        let analysis = FrameAnalysis {
            alerts: vec![FatigueAlert::Drowsiness, FatigueAlert::Yawning],
            status: FatigueStatus::Yawning,
            ..drowsy_frame()
        };

        let fired = dispatcher.dispatch(&mut session, &analysis, &ThresholdContext::default(), Instant::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, FatigueAlert::Drowsiness);
        assert_eq!(session.total_alerts, 1);
    }

    #[test]
    fn test_audio_failure_is_not_fatal() {
        let mut dispatcher = AlertDispatcher::new(&quiet_config(), Box::new(BrokenSink));
        let mut session = FatigueSession::default();

        let fired = dispatcher.dispatch(&mut session, &drowsy_frame(), &ThresholdContext::default(), Instant::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(session.total_alerts, 1);
    }

    #[test]
    fn test_muted_still_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.txt");
        let config = AlertConfig {
            log_path: Some(path.clone()),
            sound_enabled: false,
            ..Default::default()
        };
        let plays = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = AlertDispatcher::new(&config, Box::new(CountingSink(plays.clone())));
        let mut session = FatigueSession::default();

        dispatcher.dispatch(&mut session, &drowsy_frame(), &ThresholdContext::default(), Instant::now());

        assert_eq!(plays.load(Ordering::SeqCst), 0);
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("ALERT #1 | DROWSINESS | EAR=0.150 | MAR=0.300"));
    }
}
