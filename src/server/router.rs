use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{health, rag, sync};
use crate::state::AppState;

/// Room for multipart boundaries and headers around the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the application router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_allowed_origins);
    let max_upload = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/status", get(health::get_status))
        .route("/ingest", post(rag::ingest))
        .route("/ask", post(rag::ask))
        .route("/clear", post(rag::clear))
        .route("/backup", post(sync::backup))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(RequestBodyLimitLayer::new(max_upload + MULTIPART_OVERHEAD_BYTES))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    if allowed.is_empty() {
        layer.allow_origin(Any).allow_headers(Any)
    } else {
        layer
            .allow_origin(AllowOrigin::list(allowed))
            .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
    }
}
