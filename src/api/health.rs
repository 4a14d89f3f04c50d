use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    model_loaded: bool,
    version: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// GET /api/health
///
/// Always 200; `status` is "degraded" while no model artifact is loaded.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let model_loaded = state.current_model().is_some();
    Json(HealthResponse {
        status: if model_loaded { "ok" } else { "degraded" }.to_string(),
        model_loaded,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}
