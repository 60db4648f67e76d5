//! Handlers for `/batches` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/batches` | `?pharmacy_id` required; optional `item_id`, `include_inactive` |
//! | `POST`  | `/batches` | Body: [`NewBatch`]; returns 201 + stored batch |
//! | `GET`   | `/batches/:id` | 404 if not found |
//! | `PATCH` | `/batches/:id` | Body: [`BatchPatch`] |
//! | `POST`  | `/batches/:id/deactivate` | Soft delete |
//! | `POST`  | `/batches/:id/adjust` | Body: [`AdjustBody`] |
//! | `GET`   | `/batches/:id/history` | Ledger entries, ascending |
//! | `GET`   | `/batches/:id/reconcile` | Ledger replay vs. cached on-hand |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use dispensary_core::{
  Error,
  batch::{Batch, BatchFilter, BatchPatch, NewBatch},
  ledger::{self, AdjustStock, LedgerEntry, MovementCause, Reconciliation},
  store::InventoryStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, Backend, actor::Actor, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub pharmacy_id:      Option<String>,
  pub item_id:          Option<String>,
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /batches?pharmacy_id=<id>[&item_id=...][&include_inactive=true]`
pub async fn list<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Batch>>, ApiError> {
  let filter = BatchFilter {
    item_id:          params.item_id,
    include_inactive: params.include_inactive,
  };
  let batches = state
    .store
    .list_batches(params.pharmacy_id.unwrap_or_default(), filter)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(batches))
}

// ─── Receive ──────────────────────────────────────────────────────────────────

/// `POST /batches`: returns 201 + the stored [`Batch`].
pub async fn create<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Actor(actor): Actor,
  Json(body): Json<NewBatch>,
) -> Result<impl IntoResponse, ApiError> {
  let batch = state
    .store
    .create_batch(body, actor)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(batch)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /batches/:id`
pub async fn get_one<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Batch>, ApiError> {
  let batch = state
    .store
    .get_batch(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(Error::BatchNotFound(id))?;
  Ok(Json(batch))
}

// ─── Update / deactivate ──────────────────────────────────────────────────────

/// `PATCH /batches/:id`
pub async fn update<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Actor(actor): Actor,
  Path(id): Path<Uuid>,
  Json(body): Json<BatchPatch>,
) -> Result<Json<Batch>, ApiError> {
  tracing::debug!(batch_id = %id, %actor, "batch update requested");
  let batch = state
    .store
    .update_batch(id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(batch))
}

/// `POST /batches/:id/deactivate`
pub async fn deactivate<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Actor(actor): Actor,
  Path(id): Path<Uuid>,
) -> Result<Json<Batch>, ApiError> {
  tracing::debug!(batch_id = %id, %actor, "batch deactivation requested");
  let batch = state.store.deactivate(id).await.map_err(ApiError::store)?;
  Ok(Json(batch))
}

// ─── Adjust ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
  pub delta:  Option<i64>,
  /// `ADJUSTMENT` (default) or `RETURN`.
  pub cause:  Option<MovementCause>,
  pub reason: Option<String>,
}

/// `POST /batches/:id/adjust`, body: `{"delta":-2,"reason":"breakage"}`
pub async fn adjust<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Actor(actor): Actor,
  Path(id): Path<Uuid>,
  Json(body): Json<AdjustBody>,
) -> Result<Json<Batch>, ApiError> {
  let adjustment = AdjustStock {
    delta:  body.delta,
    cause:  body.cause,
    reason: body.reason,
    actor:  Some(actor),
  };
  let batch = state
    .store
    .adjust_stock(id, adjustment)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(batch))
}

// ─── Ledger ───────────────────────────────────────────────────────────────────

/// `GET /batches/:id/history`
pub async fn history<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
  let entries = state
    .store
    .history(id)
    .collect()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}

/// `GET /batches/:id/reconcile`
pub async fn reconcile<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Reconciliation>, ApiError> {
  let report = ledger::reconcile(state.store.as_ref(), id)
    .await
    .map_err(ApiError::store)?;
  if !report.consistent {
    tracing::error!(?report, "ledger does not replay to cached on-hand");
  }
  Ok(Json(report))
}
