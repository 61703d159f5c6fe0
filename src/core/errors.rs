use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Why an embedding call was rejected.
#[derive(Debug, Error)]
pub enum EmbeddingFailure {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
    #[error("embedding dimension changed: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding provider returned an empty vector")]
    EmptyVector,
}

/// Failure taxonomy of the question-answering core.
///
/// Each variant is a distinct kind callers can branch on. The `Display`
/// text is safe to show to end users.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid chunking configuration: {0}")]
    Chunking(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingFailure),
    #[error("index build aborted, previous index kept: {0}")]
    IndexBuild(String),
    #[error("index unavailable: {0}")]
    Index(String),
    #[error("No vector store found. Please ingest a document first.")]
    NoIndex,
    #[error("answer generation failed: {0}")]
    Synthesis(String),
    #[error("storage sync failed: {0}")]
    StorageSync(String),
    #[error("document could not be read: {0}")]
    Document(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl RagError {
    pub fn index_build<E: std::fmt::Display>(err: E) -> Self {
        RagError::IndexBuild(err.to_string())
    }

    pub fn index<E: std::fmt::Display>(err: E) -> Self {
        RagError::Index(err.to_string())
    }

    pub fn storage_sync<E: std::fmt::Display>(err: E) -> Self {
        RagError::StorageSync(err.to_string())
    }

    pub fn synthesis<E: std::fmt::Display>(err: E) -> Self {
        RagError::Synthesis(err.to_string())
    }

    pub fn embedding_unavailable<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(EmbeddingFailure::Unavailable(err.to_string()))
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Chunking(_) => "chunking_error",
            RagError::Embedding(_) => "embedding_error",
            RagError::IndexBuild(_) => "index_build_error",
            RagError::Index(_) => "index_error",
            RagError::NoIndex => "no_index_error",
            RagError::Synthesis(_) => "synthesis_error",
            RagError::StorageSync(_) => "storage_sync_error",
            RagError::Document(_) => "document_error",
            RagError::InvalidQuery(_) => "invalid_query",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error(transparent)]
    Rag(#[from] RagError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

fn rag_status(err: &RagError) -> StatusCode {
    match err {
        RagError::InvalidQuery(_) | RagError::Document(_) => StatusCode::BAD_REQUEST,
        RagError::NoIndex => StatusCode::CONFLICT,
        RagError::Embedding(_) | RagError::Synthesis(_) | RagError::StorageSync(_) => {
            StatusCode::BAD_GATEWAY
        }
        RagError::Chunking(_) | RagError::IndexBuild(_) | RagError::Index(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ApiError::Rag(err) => (rag_status(err), err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "{}", message);
        } else {
            tracing::warn!(status = %status, "{}", message);
        }

        let body = Json(json!({ "status": "error", "message": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_index_message_tells_user_to_ingest() {
        let message = RagError::NoIndex.to_string();
        assert!(message.contains("ingest a document first"));
    }

    #[test]
    fn embedding_failures_keep_their_detail() {
        let err: RagError = EmbeddingFailure::DimensionMismatch {
            expected: 1024,
            actual: 768,
        }
        .into();
        assert_eq!(err.kind(), "embedding_error");
        assert!(err.to_string().contains("expected 1024, got 768"));
    }

    #[test]
    fn status_codes_follow_failure_kind() {
        let cases = [
            (RagError::NoIndex, StatusCode::CONFLICT),
            (RagError::InvalidQuery("k".into()), StatusCode::BAD_REQUEST),
            (RagError::Synthesis("timeout".into()), StatusCode::BAD_GATEWAY),
            (RagError::IndexBuild("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
