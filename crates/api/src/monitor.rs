//! Detection loop and calibration runner
//!
//! At most one of {monitoring, calibration} runs at a time. The loop owns
//! its `DmsModule` outright; everything else only sees the `MonitorStatus`
//! snapshots it publishes after each frame.

use alerting::{AlertConfig, AlertDispatcher, AlertRecord};
use camera_capture::{CameraConfig, CaptureMode, FrameRead, FrameSource};
use dms::{
    face_ear, CalibrationError, CalibrationResult, Calibrator, DmsConfig, DmsModule,
    FrameSnapshot, LandmarkProvider,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::CaptureBackend;
use crate::panel::ControlPanel;
use crate::MonitorError;

/// What the UI may read
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub session_id: Option<Uuid>,
    pub frame: FrameSnapshot,
    pub last_alert: Option<AlertRecord>,
}

struct RunningSession {
    id: Uuid,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

enum Activity {
    Idle,
    Monitoring(RunningSession),
    /// Cleared by the calibration's `ActiveFlag` when it ends or is dropped
    Calibrating(Arc<AtomicBool>),
}

impl Activity {
    /// A loop that ended on its own (end of clip, camera failure) or an
    /// abandoned calibration counts as idle
    fn settle(&mut self) {
        let done = match self {
            Activity::Monitoring(session) => session.handle.is_finished(),
            Activity::Calibrating(active) => !active.load(Ordering::SeqCst),
            Activity::Idle => false,
        };
        if done {
            debug!("Previous run already finished");
            *self = Activity::Idle;
        }
    }
}

/// Marks a calibration as over when dropped, including on cancellation
struct ActiveFlag(Arc<AtomicBool>);

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Video source and landmark model held by one run; released exactly once,
/// on the normal path or when the owning future is dropped
struct CaptureDevices {
    source: Box<dyn FrameSource>,
    landmarks: Box<dyn LandmarkProvider>,
    released: bool,
}

impl CaptureDevices {
    fn open(
        backend: &dyn CaptureBackend,
        loop_playback: bool,
    ) -> Result<(Self, CaptureMode), MonitorError> {
        let (mut source, mode) = backend.open_source(loop_playback)?;
        let landmarks = match backend.open_landmarks() {
            Ok(l) => l,
            Err(e) => {
                source.release();
                return Err(e.into());
            }
        };
        Ok((
            Self {
                source,
                landmarks,
                released: false,
            },
            mode,
        ))
    }

    fn release(&mut self) {
        if !self.released {
            self.source.release();
            self.landmarks.close();
            self.released = true;
        }
    }
}

impl Drop for CaptureDevices {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the camera resource and coordinates monitoring and calibration
pub struct Monitor {
    panel: ControlPanel,
    camera: CameraConfig,
    dms_config: DmsConfig,
    alert_config: AlertConfig,
    backend: Arc<dyn CaptureBackend>,
    activity: Mutex<Activity>,
    status_tx: watch::Sender<MonitorStatus>,
}

impl Monitor {
    pub fn new(
        panel: ControlPanel,
        camera: CameraConfig,
        dms_config: DmsConfig,
        alert_config: AlertConfig,
        backend: Arc<dyn CaptureBackend>,
    ) -> Self {
        let (status_tx, _) = watch::channel(MonitorStatus::default());
        Self {
            panel,
            camera,
            dms_config,
            alert_config,
            backend,
            activity: Mutex::new(Activity::Idle),
            status_tx,
        }
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    /// Latest published status
    pub fn status(&self) -> MonitorStatus {
        self.status_tx.borrow().clone()
    }

    pub async fn is_running(&self) -> bool {
        let mut activity = self.activity.lock().await;
        activity.settle();
        matches!(*activity, Activity::Monitoring(_))
    }

    /// Acquire the video source and landmark model, then start the loop.
    ///
    /// Fails without creating a session if either resource cannot be opened.
    pub async fn start(&self) -> Result<Uuid, MonitorError> {
        let mut activity = self.activity.lock().await;
        activity.settle();
        match *activity {
            Activity::Monitoring(_) => return Err(MonitorError::AlreadyRunning),
            Activity::Calibrating(_) => return Err(MonitorError::Busy),
            Activity::Idle => {}
        }

        let settings = self.panel.get().await;
        let dms = DmsModule::new(DmsConfig {
            ear_threshold: settings.ear_threshold,
            mar_threshold: settings.mar_threshold,
            ..self.dms_config.clone()
        })?;

        let (devices, mode) = CaptureDevices::open(self.backend.as_ref(), settings.loop_playback)?;
        let dispatcher = AlertDispatcher::new(&self.alert_config, self.backend.audio_sink());

        let id = Uuid::new_v4();
        let stop = Arc::new(AtomicBool::new(false));
        let run = SessionRun {
            id,
            devices,
            mode,
            dms,
            dispatcher,
            panel: self.panel.clone(),
            camera: self.camera.clone(),
            stop: stop.clone(),
            status_tx: self.status_tx.clone(),
        };

        self.status_tx.send_replace(MonitorStatus {
            running: true,
            session_id: Some(id),
            ..Default::default()
        });
        let handle = tokio::spawn(run.run());
        *activity = Activity::Monitoring(RunningSession { id, stop, handle });

        info!("Monitoring session {} started", id);
        Ok(id)
    }

    /// Request a stop and wait for the loop to release its resources
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let mut activity = self.activity.lock().await;
        activity.settle();
        let session = match &mut *activity {
            Activity::Monitoring(session) => session,
            Activity::Calibrating(_) => return Err(MonitorError::Busy),
            Activity::Idle => return Err(MonitorError::NotRunning),
        };

        // Stays Monitoring until joined, so a dropped stop request is settled later
        session.stop.store(true, Ordering::SeqCst);
        if let Err(e) = (&mut session.handle).await {
            error!("Session {} ended abnormally: {}", session.id, e);
        }
        info!("Monitoring session {} stopped", session.id);
        *activity = Activity::Idle;
        Ok(())
    }

    /// Sample the open-eye baseline and install the derived EAR cutoff.
    ///
    /// Refused while monitoring; on failure the panel is left untouched.
    pub async fn calibrate(&self) -> Result<CalibrationResult, MonitorError> {
        let flag = {
            let mut activity = self.activity.lock().await;
            activity.settle();
            let refused: Option<MonitorError> = match *activity {
                Activity::Monitoring(_) => Some(CalibrationError::MonitoringActive.into()),
                Activity::Calibrating(_) => Some(MonitorError::Busy),
                Activity::Idle => None,
            };
            if let Some(e) = refused {
                return Err(e);
            }
            let active = Arc::new(AtomicBool::new(true));
            *activity = Activity::Calibrating(active.clone());
            ActiveFlag(active)
        };

        let result = self.sample_baseline(flag).await?;
        let applied = self.panel.set_ear_threshold(result.ear_threshold).await;
        info!(
            "Calibrated open-eye EAR {:.3}; alert threshold now {:.3}",
            result.base_open_ear, applied
        );
        Ok(result)
    }

    /// `_flag` outlives the devices, so the camera is free before the
    /// monitor reads as idle again
    async fn sample_baseline(&self, _flag: ActiveFlag) -> Result<CalibrationResult, MonitorError> {
        let settings = self.panel.get().await;
        let (mut devices, mode) =
            CaptureDevices::open(self.backend.as_ref(), settings.loop_playback)?;

        info!("Calibrating: keep your eyes wide open for 3 seconds");
        let mut calibrator = Calibrator::new();
        let started = Instant::now();

        while started.elapsed() < dms::calibration::CALIBRATION_WINDOW {
            let frame = match devices.source.read_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::EndOfStream) if mode.loops() => {
                    if devices.source.rewind().is_err() {
                        break;
                    }
                    continue;
                }
                Ok(FrameRead::EndOfStream) => break,
                Err(e) => {
                    warn!("Calibration frame read failed: {}", e);
                    tokio::time::sleep(self.camera.frame_delay()).await;
                    continue;
                }
            };

            let ear = frame
                .resize(self.camera.width, self.camera.height)
                .ok()
                .and_then(|f| devices.landmarks.detect(&f).ok().flatten())
                .and_then(|face| face_ear(&face));
            calibrator.add_sample(ear);

            tokio::time::sleep(self.camera.frame_delay()).await;
        }

        devices.release();
        Ok(calibrator.finish()?)
    }
}

/// Everything one detection loop owns
struct SessionRun {
    id: Uuid,
    devices: CaptureDevices,
    mode: CaptureMode,
    dms: DmsModule,
    dispatcher: AlertDispatcher,
    panel: ControlPanel,
    camera: CameraConfig,
    stop: Arc<AtomicBool>,
    status_tx: watch::Sender<MonitorStatus>,
}

impl SessionRun {
    async fn run(mut self) {
        self.dms.start(Instant::now().into_std());
        let mut last_alert = None;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!("Stop requested for session {}", self.id);
                break;
            }

            let frame = match self.devices.source.read_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::EndOfStream) if self.mode.loops() => {
                    if let Err(e) = self.devices.source.rewind() {
                        warn!("Cannot loop clip: {}", e);
                        break;
                    }
                    continue;
                }
                Ok(FrameRead::EndOfStream) => {
                    info!("End of stream, ending session {}", self.id);
                    break;
                }
                Err(e) => {
                    error!("Frame read failed, ending session {}: {}", self.id, e);
                    break;
                }
            };

            let frame = match frame.resize(self.camera.width, self.camera.height) {
                Ok(f) => f,
                Err(e) => {
                    warn!("Dropping frame {}: {}", frame.sequence, e);
                    continue;
                }
            };

            let face = self.devices.landmarks.detect(&frame).unwrap_or_else(|e| {
                warn!("Landmark lookup failed on frame {}: {}", frame.sequence, e);
                None
            });

            // Settings are read fresh every frame
            let settings = self.panel.get().await;
            if let Err(e) = self
                .dms
                .set_thresholds(settings.ear_threshold, settings.mar_threshold)
            {
                warn!("Ignoring panel thresholds: {}", e);
            }
            self.dispatcher.set_sound_enabled(settings.sound_enabled);
            let ctx = settings.context();

            let t = Instant::now().into_std();
            let analysis = self.dms.analyze(face.as_ref(), &ctx, t);
            let fired = self
                .dispatcher
                .dispatch(self.dms.session_mut(), &analysis, &ctx, t);
            if let Some(record) = fired.into_iter().last() {
                last_alert = Some(record);
            }

            self.status_tx.send_replace(MonitorStatus {
                running: true,
                session_id: Some(self.id),
                frame: self.dms.snapshot(&analysis, &ctx, t),
                last_alert: last_alert.clone(),
            });

            tokio::time::sleep(self.camera.frame_delay()).await;
        }

        self.dms.reset_state();
        self.devices.release();
        self.status_tx.send_modify(|status| {
            status.running = false;
            status.frame.status_text = "Stopped".to_string();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReplayBackend;
    use crate::panel::Settings;
    use alerting::{AudioSink, PcmBufferSink};
    use camera_capture::{CameraError, ClipSource};
    use dms::detector::{LEFT_EYE, LEFT_MOUTH, LOWER_LIP, RIGHT_EYE, RIGHT_MOUTH, UPPER_LIP};
    use dms::{DmsError, TraceProvider};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Normalized face mesh with both eyes near `ear` at 640x480 and a closed mouth
    fn mesh(ear: f64) -> Vec<(f64, f64)> {
        let mut points = vec![(0.5, 0.5); 468];
        let half = ear * 0.1 * (640.0 / 480.0) / 2.0;
        for (indices, x0) in [(LEFT_EYE, 0.2), (RIGHT_EYE, 0.6)] {
            let outline = [
                (x0, 0.4),
                (x0 + 0.033, 0.4 - half),
                (x0 + 0.066, 0.4 - half),
                (x0 + 0.1, 0.4),
                (x0 + 0.066, 0.4 + half),
                (x0 + 0.033, 0.4 + half),
            ];
            for (i, p) in indices.iter().zip(outline) {
                points[*i] = p;
            }
        }
        points[LEFT_MOUTH] = (0.4, 0.7);
        points[RIGHT_MOUTH] = (0.6, 0.7);
        for i in UPPER_LIP {
            points[i] = (0.5, 0.69);
        }
        for i in LOWER_LIP {
            points[i] = (0.5, 0.71);
        }
        points
    }

    fn backend(ear: f64, frames: usize) -> Arc<dyn CaptureBackend> {
        quiet(TraceProvider::new(vec![Some(mesh(ear)); frames]).unwrap()).0
    }

    /// Quiet replay backend plus a count of source releases
    fn quiet(trace: TraceProvider) -> (Arc<dyn CaptureBackend>, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let backend = QuietBackend {
            replay: ReplayBackend::from_trace(trace, CameraConfig::default()),
            released: released.clone(),
        };
        (Arc::new(backend), released)
    }

    /// Replay backend without the terminal bell
    struct QuietBackend {
        replay: ReplayBackend,
        released: Arc<AtomicUsize>,
    }

    impl CaptureBackend for QuietBackend {
        fn open_source(
            &self,
            loop_playback: bool,
        ) -> Result<(Box<dyn FrameSource>, CaptureMode), CameraError> {
            let (inner, mode) = self.replay.open_source(loop_playback)?;
            let source = CountedSource {
                inner,
                released: self.released.clone(),
            };
            Ok((Box::new(source), mode))
        }

        fn open_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, DmsError> {
            self.replay.open_landmarks()
        }

        fn audio_sink(&self) -> Box<dyn AudioSink> {
            Box::new(PcmBufferSink::default())
        }
    }

    struct CountedSource {
        inner: Box<dyn FrameSource>,
        released: Arc<AtomicUsize>,
    }

    impl FrameSource for CountedSource {
        fn read_frame(&mut self) -> Result<FrameRead, CameraError> {
            self.inner.read_frame()
        }

        fn rewind(&mut self) -> Result<(), CameraError> {
            self.inner.rewind()
        }

        fn release(&mut self) {
            self.inner.release();
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoCamera;

    impl CaptureBackend for NoCamera {
        fn open_source(&self, _: bool) -> Result<(Box<dyn FrameSource>, CaptureMode), CameraError> {
            Err(CameraError::Open("/dev/video0 busy".into()))
        }

        fn open_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, DmsError> {
            unreachable!("landmarks are only loaded after the camera opens")
        }

        fn audio_sink(&self) -> Box<dyn AudioSink> {
            Box::new(PcmBufferSink::default())
        }
    }

    fn monitor(backend: Arc<dyn CaptureBackend>, settings: Settings) -> Monitor {
        Monitor::new(
            ControlPanel::new(settings),
            CameraConfig::default(),
            DmsConfig::default(),
            AlertConfig {
                log_path: None,
                ..Default::default()
            },
            backend,
        )
    }

    async fn wait_idle(monitor: &Monitor) {
        for _ in 0..200 {
            if !monitor.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("session never finished");
    }

    #[test]
    fn test_mesh_ear() {
        let face = dms::FaceLandmarks::from_normalized(&mesh(0.3), 640, 480);
        let ear = face_ear(&face).unwrap();
        assert!((ear - 0.3).abs() < 0.05, "ear was {}", ear);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_closure_alerts_with_rate_limit() {
        // ~5s of closed eyes at 60 km/h: alerts near 2s and 4s, nothing in between
        let monitor = monitor(backend(0.1, 150), Settings::default());
        monitor.start().await.unwrap();
        wait_idle(&monitor).await;

        let status = monitor.status();
        assert!(!status.running);
        assert_eq!(status.frame.total_alerts, 2);
        let last = status.last_alert.unwrap();
        assert_eq!(last.index, 2);
        assert_eq!(last.kind, dms::FatigueAlert::Drowsiness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parked_vehicle_never_alerts() {
        let settings = Settings {
            speed_kmh: 5.0,
            ..Default::default()
        };
        let monitor = monitor(backend(0.1, 150), settings);
        monitor.start().await.unwrap();
        wait_idle(&monitor).await;

        assert_eq!(monitor.status().frame.total_alerts, 0);
        assert!(monitor.status().last_alert.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_exclusivity() {
        let settings = Settings {
            loop_playback: true,
            ..Default::default()
        };
        let monitor = monitor(backend(0.3, 10), settings);

        let id = monitor.start().await.unwrap();
        assert!(matches!(monitor.start().await, Err(MonitorError::AlreadyRunning)));
        assert!(matches!(
            monitor.calibrate().await,
            Err(MonitorError::Calibration(CalibrationError::MonitoringActive))
        ));

        // Looping clip keeps the session alive past the clip length
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(monitor.is_running().await);
        assert_eq!(monitor.status().session_id, Some(id));
        assert_eq!(monitor.status().frame.status_text, "ATTENTIVE");

        monitor.stop().await.unwrap();
        assert!(!monitor.is_running().await);
        assert_eq!(monitor.status().frame.status_text, "Stopped");
        assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));

        let restarted = monitor.start().await.unwrap();
        assert_ne!(restarted, id);
        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unopenable_camera_creates_no_session() {
        let monitor = monitor(Arc::new(NoCamera), Settings::default());
        assert!(matches!(monitor.start().await, Err(MonitorError::Camera(_))));
        assert!(!monitor.is_running().await);
        assert_eq!(monitor.status().session_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_installs_threshold() {
        let settings = Settings {
            loop_playback: true,
            ..Default::default()
        };
        let monitor = monitor(backend(0.34, 30), settings);

        let result = monitor.calibrate().await.unwrap();
        assert!(result.samples >= 10);
        let expected = (result.base_open_ear * 0.65).max(0.18);
        assert!((result.ear_threshold - expected).abs() < 1e-12);
        assert_eq!(monitor.panel().get().await.ear_threshold, result.ear_threshold);

        // Calibration released the camera; monitoring may start now
        monitor.start().await.unwrap();
        monitor.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_failure_leaves_threshold() {
        let (backend, released) = quiet(TraceProvider::new(vec![None; 5]).unwrap());
        let monitor = monitor(backend, Settings::default());

        let err = monitor.calibrate().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Calibration(CalibrationError::InsufficientSamples { .. })
        ));
        assert_eq!(monitor.panel().get().await.ear_threshold, 0.25);
        assert!(!monitor.is_running().await);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_calibration_frees_camera() {
        let settings = Settings {
            loop_playback: true,
            ..Default::default()
        };
        let (backend, released) = quiet(TraceProvider::new(vec![Some(mesh(0.34)); 30]).unwrap());
        let monitor = monitor(backend, settings);

        // Caller gives up well inside the sampling window
        let cancelled = tokio::time::timeout(Duration::from_millis(500), monitor.calibrate()).await;
        assert!(cancelled.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.panel().get().await.ear_threshold, 0.25);

        monitor.start().await.unwrap();
        monitor.stop().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 2);

        // And a later calibration runs to completion
        let result = monitor.calibrate().await.unwrap();
        assert_eq!(monitor.panel().get().await.ear_threshold, result.ear_threshold);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_clip_ended_is_not_running() {
        let monitor = monitor(backend(0.3, 10), Settings::default());
        monitor.start().await.unwrap();

        // Ten frames end long before this
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));
        assert!(!monitor.status().running);
        assert!(monitor.start().await.is_ok());
        monitor.stop().await.unwrap();
    }

    #[test]
    fn test_clip_source_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ClipSource>();
        assert_send::<Box<dyn FrameSource>>();
    }
}
