use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::errors::ApiError;
use crate::document::Document;
use crate::state::AppState;

const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: Option<String>,
    pub k: Option<usize>,
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct AskMetadata {
    pub context_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_chunks_retrieved: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub status: &'static str,
    pub answer: String,
    pub metadata: AskMetadata,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Ingesting document");

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, data));
        break;
    }

    let Some((filename, data)) = upload else {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    };
    if filename.trim().is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }

    let document = tokio::task::spawn_blocking(move || Document::from_upload(&filename, &data))
        .await
        .map_err(ApiError::internal)??;

    let outcome = state.engine.ingest(document).await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Document ingested successfully. Created {} chunks.", outcome.chunks),
    })))
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        JsonRejection::MissingJsonContentType(_) | JsonRejection::JsonSyntaxError(_) => {
            ApiError::BadRequest("No query provided".to_string())
        }
        other => ApiError::BadRequest(other.body_text()),
    })?;
    let Some(query) = request.query else {
        return Err(ApiError::BadRequest("No query provided".to_string()));
    };

    let defaults = state.engine.retrieval_defaults();
    let outcome = state
        .engine
        .ask(
            &query,
            request.k.unwrap_or(defaults.k),
            request.score_threshold.unwrap_or(defaults.score_threshold),
        )
        .await?;

    Ok(Json(AskResponse {
        status: "success",
        answer: outcome.answer,
        metadata: AskMetadata {
            context_found: outcome.context_found,
            num_chunks_retrieved: outcome
                .context_found
                .then_some(outcome.num_chunks_retrieved),
        },
    }))
}

pub async fn clear(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.clear().await;
    Json(json!({
        "status": "success",
        "message": "Vector store cleared successfully",
    }))
}
