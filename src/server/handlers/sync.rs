use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Uploads the current index directory. Ingest and clear wait until the
/// archive has been taken.
pub async fn backup(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let Some(sync) = &state.sync else {
        return Err(ApiError::BadRequest("Storage sync is not configured".to_string()));
    };

    let outcome = {
        let _paused = state.engine.pause_writes().await;
        sync.backup().await?
    };

    Ok(Json(json!({
        "status": "success",
        "outcome": outcome,
        "message": outcome.message(),
    })))
}
