//! Driver Fatigue Monitor Control API
//!
//! Hosts the detection loop and exposes the control panel over HTTP:
//! settings, start/stop, calibration and the live status snapshot.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use camera_capture::CameraError;
use dms::{CalibrationError, DmsError};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

pub mod backend;
pub mod config;
pub mod monitor;
pub mod panel;
pub mod rate_limit;
mod routes;

pub use backend::{CaptureBackend, ReplayBackend};
pub use config::AppConfig;
pub use monitor::{Monitor, MonitorStatus};
pub use panel::{ControlPanel, Settings, SettingsPatch};

use rate_limit::{create_governor_config, RateLimitConfig};

/// Monitor control errors
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitoring is already running")]
    AlreadyRunning,

    #[error("Monitoring is not running")]
    NotRunning,

    #[error("Calibration in progress")]
    Busy,

    #[error("Video source unavailable: {0}")]
    Camera(#[from] CameraError),

    #[error("Landmark detector unavailable: {0}")]
    Landmarks(#[from] DmsError),

    #[error("Calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl MonitorError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            MonitorError::AlreadyRunning => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
            MonitorError::NotRunning => (StatusCode::CONFLICT, "NOT_RUNNING"),
            MonitorError::Busy => (StatusCode::CONFLICT, "CALIBRATING"),
            MonitorError::Calibration(CalibrationError::MonitoringActive) => {
                (StatusCode::CONFLICT, "MONITORING_ACTIVE")
            }
            MonitorError::Calibration(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CALIBRATION_FAILED")
            }
            MonitorError::Camera(_) => (StatusCode::SERVICE_UNAVAILABLE, "CAMERA_UNAVAILABLE"),
            MonitorError::Landmarks(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "DETECTOR_UNAVAILABLE")
            }
        }
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        warn!("Request failed: {}", self);
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub monitor: Monitor,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, rate_limit: Option<&RateLimitConfig>) -> Router {
    let router = Router::new()
        .route("/api/v1/health", get(routes::status::health))
        .route("/api/v1/status", get(routes::status::get_status))
        .route(
            "/api/v1/settings",
            get(routes::settings::get_settings).put(routes::settings::update_settings),
        )
        .route("/api/v1/monitor/start", post(routes::control::start))
        .route("/api/v1/monitor/stop", post(routes::control::stop))
        .route("/api/v1/calibrate", post(routes::control::calibrate))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match rate_limit.map(|c| (c, create_governor_config(c))) {
        Some((_, Some(config))) => router.layer(GovernorLayer { config }),
        Some((c, None)) => {
            warn!("Ignoring unusable rate limit {:?}", c);
            router
        }
        None => router,
    }
}

/// Initialize logging
pub fn init_logging(level: &str, json: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// Serve the control API until Ctrl-C, then stop any running session
pub async fn run_server(
    addr: &str,
    state: Arc<AppState>,
    rate_limit: Option<&RateLimitConfig>,
) -> anyhow::Result<()> {
    let app = create_router(state.clone(), rate_limit);

    info!("Starting control API on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for shutdown signal: {}", e);
        }
    })
    .await?;

    if state.monitor.is_running().await {
        state.monitor.stop().await?;
    }
    info!("Control API shut down");
    Ok(())
}
