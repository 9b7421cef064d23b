//! Status Routes

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::monitor::MonitorStatus;
use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitoring: bool,
}

/// Health check
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        monitoring: state.monitor.is_running().await,
    })
}

/// Latest frame snapshot: ratios, status text, counters and telemetry history
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.monitor.status())
}
