//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use dispensary_core::store::StoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(dispensary_core::Error),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error: domain failures keep their meaning, anything
  /// else is an internal error.
  pub fn store<E: StoreError>(err: E) -> Self {
    match err.domain() {
      Some(domain) => Self::Domain(domain.clone()),
      None => Self::Store(Box::new(err)),
    }
  }
}

impl From<dispensary_core::Error> for ApiError {
  fn from(err: dispensary_core::Error) -> Self { Self::Domain(err) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind) = match &self {
      ApiError::Domain(e) => {
        let status = match e {
          dispensary_core::Error::Validation(_) => StatusCode::BAD_REQUEST,
          dispensary_core::Error::BatchNotFound(_) => StatusCode::NOT_FOUND,
          dispensary_core::Error::Consistency { .. } => StatusCode::CONFLICT,
          dispensary_core::Error::InsufficientStock { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
          }
        };
        (status, e.kind())
      }
      ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
      }
    };
    (status, Json(json!({ "error": self.to_string(), "kind": kind }))).into_response()
  }
}
