//! Control panel routes

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::panel::{Settings, SettingsPatch};
use crate::AppState;

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.monitor.panel().get().await)
}

/// Apply a partial update; out-of-range sliders are clamped, not rejected
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> Json<Settings> {
    Json(state.monitor.panel().update(patch).await)
}
