//! Handler for `GET /alerts`.
//!
//! Recomputed on every call from live stock and the current clock.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use dispensary_core::alerts::{self, AlertReport};
use serde::Deserialize;

use crate::{ApiState, Backend, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct AlertParams {
  pub pharmacy_id: Option<String>,
  /// Expiry lookahead in days; defaults to the configured value.
  pub days:        Option<i64>,
}

/// `GET /alerts?pharmacy_id=<id>[&days=120]`
pub async fn handler<S: Backend>(
  State(state): State<Arc<ApiState<S>>>,
  Query(params): Query<AlertParams>,
) -> Result<Json<AlertReport>, ApiError> {
  let pharmacy_id = params.pharmacy_id.unwrap_or_default();
  let days = params.days.unwrap_or(state.alert_lookahead_days);
  let report = alerts::report(state.store.as_ref(), &pharmacy_id, days, state.clock.now())
    .await
    .map_err(ApiError::store)?;
  tracing::debug!(
    %pharmacy_id,
    days,
    total = report.summary.total_alerts,
    critical = report.summary.critical,
    "alerts evaluated"
  );
  Ok(Json(report))
}
