//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - the three LLM endpoints at the root and again under `/functions/v1/`
/// - `GET /health`
/// - static client bundle from `static_dir` with index fallback
/// - CORS (any origin/method/headers); preflights never reach the handlers
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    let static_service = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{}/index.html", static_dir)));

    let api = Router::new()
        .route("/generate-story", post(http::http_generate_story).options(http::http_preflight))
        .route("/analyze-sentence", post(http::http_analyze_sentence).options(http::http_preflight))
        .route(
            "/comprehension-questions",
            post(http::http_comprehension).options(http::http_preflight),
        );

    Router::new()
        .route("/health", get(http::http_health))
        .merge(api.clone())
        .nest("/functions/v1", api)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
