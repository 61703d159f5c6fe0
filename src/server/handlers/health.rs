use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.status().await?;
    let storage = state.sync.as_ref().map(|sync| {
        json!({
            "backend": state.config.storage.backend,
            "bucket": state.config.storage.bucket,
            "archive_key": sync.archive_key(),
        })
    });

    Ok(Json(json!({
        "status": "success",
        "engine": engine,
        "index_dir": state.engine.index_dir(),
        "embedding_model": state.config.provider.embedding_model,
        "generation_model": state.config.provider.generation_model,
        "storage": storage,
    })))
}
