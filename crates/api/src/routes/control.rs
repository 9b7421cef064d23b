//! Start, stop and calibrate

use axum::{extract::State, http::StatusCode, Json};
use dms::CalibrationResult;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{AppState, MonitorError};

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CalibrationResponse {
    #[serde(flatten)]
    pub result: CalibrationResult,
    /// Cutoff installed on the control panel after range clamping
    pub applied_threshold: f64,
}

pub async fn start(State(state): State<Arc<AppState>>) -> Result<Json<StartResponse>, MonitorError> {
    let session_id = state.monitor.start().await?;
    Ok(Json(StartResponse { session_id }))
}

/// Waits until the loop has released the camera
pub async fn stop(State(state): State<Arc<AppState>>) -> Result<StatusCode, MonitorError> {
    state.monitor.stop().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn calibrate(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CalibrationResponse>, MonitorError> {
    let result = state.monitor.calibrate().await?;
    let applied_threshold = state.monitor.panel().get().await.ear_threshold;
    Ok(Json(CalibrationResponse {
        result,
        applied_threshold,
    }))
}
