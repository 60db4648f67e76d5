//! Handlers for `/reorder-levels` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/reorder-levels/:pharmacy_id` | Map of item id to level |
//! | `PUT`  | `/reorder-levels/:pharmacy_id/:item_id` | Body: `{"reorder_level":20}`; 204 |

use std::{collections::HashMap, sync::Arc};

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use dispensary_core::store::ItemCatalog;
use serde::Deserialize;

use crate::{ApiState, Backend, actor::Actor, error::ApiError};

/// `GET /reorder-levels/:pharmacy_id`
pub async fn list<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Path(pharmacy_id): Path<String>,
) -> Result<Json<HashMap<String, i64>>, ApiError> {
  let levels = state
    .store
    .reorder_levels(pharmacy_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(levels))
}

#[derive(Debug, Deserialize)]
pub struct LevelBody {
  pub reorder_level: i64,
}

/// `PUT /reorder-levels/:pharmacy_id/:item_id`
pub async fn set<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Actor(actor): Actor,
  Path((pharmacy_id, item_id)): Path<(String, String)>,
  Json(body): Json<LevelBody>,
) -> Result<StatusCode, ApiError> {
  tracing::debug!(%pharmacy_id, %item_id, %actor, "reorder level change requested");
  state
    .store
    .set_reorder_level(pharmacy_id, item_id, body.reorder_level)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
