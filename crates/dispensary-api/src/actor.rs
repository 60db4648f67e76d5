//! The acting identity, as asserted by the upstream authentication layer.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const ACTOR_HEADER: &str = "x-actor";

/// Who is performing a write. Recorded on every ledger entry.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .headers
      .get(ACTOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(|v| Actor(v.to_owned()))
      .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_HEADER} header")))
  }
}
