//! Handler-boundary errors and their HTTP mapping.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::protocol::ErrorOut;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("LLM_API_KEY is not configured")]
  MissingCredential,
  #[error("{0}")]
  BadRequest(String),
  /// `action` completes "Failed to ...", e.g. "analyze sentence".
  #[error("Failed to {action}: {source}")]
  Upstream { action: &'static str, source: GatewayError },
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::MissingCredential | ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn upstream(action: &'static str) -> impl FnOnce(GatewayError) -> ApiError {
    move |source| ApiError::Upstream { action, source }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status(), Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

/// Reject missing or blank required fields.
pub fn require<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
  if value.trim().is_empty() {
    Err(ApiError::BadRequest(format!("'{}' is required", field)))
  } else {
    Ok(value)
  }
}
