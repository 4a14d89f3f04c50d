use axum::{extract::State, Json};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::ml::artifact::{self, ModelMetadata};

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    metadata: ModelMetadata,
    threshold: f64,
    feature_count: usize,
}

/// GET /api/model
pub async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    let model = state
        .current_model()
        .ok_or_else(|| ApiError::NotFound("no model loaded".to_string()))?;
    Ok(Json(ModelInfo {
        metadata: model.metadata.clone(),
        threshold: model.threshold,
        feature_count: model.feature_names.len(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    status: String,
    model_id: String,
}

/// POST /api/model/reload
///
/// Re-reads the artifact pair from disk and swaps the serving model
/// wholesale. Requests already running keep the reference they hold.
pub async fn reload_model(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let model = artifact::load(Path::new(&state.cfg.model.artifact_dir))?;
    let model_id = model.metadata.model_id.clone();
    state.swap_model(model);
    info!(%model_id, "model artifact reloaded");
    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        model_id,
    }))
}
