//! HTTP endpoint handlers. Thin wrappers that decode the body, forward to
//! `logic` and shape the JSON reply. Every failure leaves as `{"error": ...}`.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, instrument};

use crate::error::ApiError;
use crate::logic::{analyze_sentence, comprehension, generate_story};
use crate::protocol::*;
use crate::state::AppState;

fn decode<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
  payload
    .map(|Json(body)| body)
    .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn log_failure(endpoint: &str, e: &ApiError) {
  let last_model = match e {
    ApiError::Upstream { source, .. } => source.model(),
    _ => None,
  };
  error!(target: "story_backend", %endpoint, status = e.status().as_u16(), last_model = ?last_model, error = %e, "Request failed");
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

/// Bare `OPTIONS` on any endpoint. Real preflights are answered by the CORS layer.
pub async fn http_preflight() -> StatusCode { StatusCode::OK }

#[instrument(level = "info", skip_all)]
pub async fn http_generate_story(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<StoryIn>, JsonRejection>,
) -> Response {
  let result = match decode(payload) {
    Ok(body) => generate_story(&state, &body).await,
    Err(e) => Err(e),
  };
  match result {
    Ok(story) => Json(StoryOut::from(story)).into_response(),
    Err(e) => {
      log_failure("generate-story", &e);
      (e.status(), Json(StoryOut::failed(e.to_string()))).into_response()
    }
  }
}

#[instrument(level = "info", skip_all)]
pub async fn http_analyze_sentence(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<AnalyzeIn>, JsonRejection>,
) -> Result<Json<AnalysisOut>, ApiError> {
  let body = decode(payload)?;
  analyze_sentence(&state, &body)
    .await
    .map(|analysis| Json(AnalysisOut { analysis }))
    .inspect_err(|e| log_failure("analyze-sentence", e))
}

#[instrument(level = "info", skip_all)]
pub async fn http_comprehension(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<ComprehensionIn>, JsonRejection>,
) -> Result<Json<ComprehensionOut>, ApiError> {
  let body = decode(payload)?;
  comprehension(&state, &body)
    .await
    .map(Json)
    .inspect_err(|e| log_failure("comprehension-questions", e))
}
