//! Handler for `POST /dispense`.

use std::sync::Arc;

use axum::{Json, extract::State};
use dispensary_core::{
  allocation::{Allocation, DispenseRequest},
  store::InventoryStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, Backend, actor::Actor, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct DispenseBody {
  pub pharmacy_id: Option<String>,
  pub item_id:     Option<String>,
  pub quantity:    Option<i64>,
  /// Dispense transaction id; shared by every ledger entry written.
  pub reference:   Option<String>,
  /// Pharmacist override: draw from this batch only.
  pub batch_id:    Option<Uuid>,
}

/// `POST /dispense`: returns the allocation, or 422 when stock is short.
/// Nothing is written unless the whole quantity can be served.
pub async fn handler<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Actor(actor): Actor,
  Json(body): Json<DispenseBody>,
) -> Result<Json<Allocation>, ApiError> {
  let request = DispenseRequest {
    pharmacy_id: body.pharmacy_id,
    item_id:     body.item_id,
    quantity:    body.quantity,
    reference:   body.reference,
    actor:       Some(actor),
    batch_id:    body.batch_id,
  };
  let allocation = state
    .store
    .dispense(request)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(allocation))
}
