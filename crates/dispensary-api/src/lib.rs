//! JSON REST API for the dispensary inventory engine.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`InventoryStore`] and [`ItemCatalog`]. Authentication is the caller's
//! responsibility; the authenticated user id arrives in the
//! [`actor::ACTOR_HEADER`] header and is required on every write.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", dispensary_api::api_router(state))
//! ```

pub mod actor;
pub mod alerts;
pub mod batches;
pub mod catalog;
pub mod dispense;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use dispensary_core::{
  clock::Clock,
  store::{InventoryStore, ItemCatalog},
};

pub use error::ApiError;

/// A store the API can serve from: batches, ledger, and reorder levels
/// behind one error type.
pub trait Backend:
  InventoryStore + ItemCatalog<Error = <Self as InventoryStore>::Error> + 'static
{
}

impl<T> Backend for T where
  T: InventoryStore + ItemCatalog<Error = <T as InventoryStore>::Error> + 'static
{
}

/// Shared handler state.
pub struct ApiState<S> {
  pub store:                Arc<S>,
  pub clock:                Arc<dyn Clock>,
  /// Expiry lookahead used by `GET /alerts` when `days` is omitted.
  pub alert_lookahead_days: i64,
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: Backend>(state: Arc<ApiState<S>>) -> Router<()> {
  Router::new()
    // Batches
    .route("/batches", get(batches::list::<S>).post(batches::create::<S>))
    .route(
      "/batches/{id}",
      get(batches::get_one::<S>).patch(batches::update::<S>),
    )
    .route("/batches/{id}/deactivate", post(batches::deactivate::<S>))
    .route("/batches/{id}/adjust", post(batches::adjust::<S>))
    .route("/batches/{id}/history", get(batches::history::<S>))
    .route("/batches/{id}/reconcile", get(batches::reconcile::<S>))
    // Dispensing
    .route("/dispense", post(dispense::handler::<S>))
    // Alerts
    .route("/alerts", get(alerts::handler::<S>))
    // Reorder levels
    .route("/reorder-levels/{pharmacy_id}", get(catalog::list::<S>))
    .route("/reorder-levels/{pharmacy_id}/{item_id}", put(catalog::set::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::{TimeZone, Utc};
  use dispensary_core::{alerts::DEFAULT_LOOKAHEAD_DAYS, clock::FixedClock};
  use dispensary_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt;

  use super::*;
  use crate::actor::ACTOR_HEADER;

  async fn make_state() -> Arc<ApiState<SqliteStore>> {
    let clock: Arc<dyn Clock> =
      Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()));
    let store = SqliteStore::open_in_memory()
      .await
      .unwrap()
      .with_clock(clock.clone());
    Arc::new(ApiState {
      store: Arc::new(store),
      clock,
      alert_lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
    })
  }

  async fn send(
    state:  &Arc<ApiState<SqliteStore>>,
    method: &str,
    uri:    &str,
    actor:  Option<&str>,
    body:   Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
      builder = builder.header(ACTOR_HEADER, actor);
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(state.clone())
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  async fn receive(
    state: &Arc<ApiState<SqliteStore>>,
    batch_no: &str,
    expiry: &str,
    qty: i64,
  ) -> Value {
    let (status, batch) = send(
      state,
      "POST",
      "/batches",
      Some("pharmacist-1"),
      Some(json!({
        "pharmacy_id": "ph-1",
        "item_id": "amoxicillin-500",
        "supplier_id": "sup-1",
        "batch_no": batch_no,
        "expiry_date": expiry,
        "qty_received_units": qty,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{batch}");
    batch
  }

  // ── Actor ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn writes_without_actor_are_unauthorized() {
    let state = make_state().await;
    let (status, body) = send(
      &state,
      "POST",
      "/batches",
      None,
      Some(json!({ "pharmacy_id": "ph-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
  }

  #[tokio::test]
  async fn blank_actor_is_unauthorized() {
    let state = make_state().await;
    let (status, _) = send(
      &state,
      "POST",
      "/dispense",
      Some("   "),
      Some(json!({ "pharmacy_id": "ph-1", "item_id": "x", "quantity": 1, "reference": "rx-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  // ── Batches ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn receive_returns_created_batch() {
    let state = make_state().await;
    let batch = receive(&state, "A-1", "2025-06-30", 50).await;
    assert_eq!(batch["qty_on_hand_units"], 50);
    assert_eq!(batch["active"], true);

    let id = batch["batch_id"].as_str().unwrap();
    let (status, fetched) = send(&state, "GET", &format!("/batches/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, batch);
  }

  #[tokio::test]
  async fn receive_with_missing_fields_is_bad_request() {
    let state = make_state().await;
    let (status, body) = send(
      &state,
      "POST",
      "/batches",
      Some("pharmacist-1"),
      Some(json!({ "pharmacy_id": "ph-1", "item_id": "x", "qty_received_units": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
  }

  #[tokio::test]
  async fn list_requires_pharmacy() {
    let state = make_state().await;
    let (status, _) = send(&state, "GET", "/batches", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn unknown_batch_is_not_found() {
    let state = make_state().await;
    let id = uuid::Uuid::now_v7();
    let (status, body) = send(&state, "GET", &format!("/batches/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
  }

  #[tokio::test]
  async fn deactivated_batch_leaves_default_listing() {
    let state = make_state().await;
    let batch = receive(&state, "A-1", "2025-06-30", 10).await;
    let id = batch["batch_id"].as_str().unwrap();

    let (status, body) = send(
      &state,
      "POST",
      &format!("/batches/{id}/deactivate"),
      Some("manager"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (_, listed) = send(&state, "GET", "/batches?pharmacy_id=ph-1", None, None).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);
    let (_, all) = send(
      &state,
      "GET",
      "/batches?pharmacy_id=ph-1&include_inactive=true",
      None,
      None,
    )
    .await;
    assert_eq!(all.as_array().unwrap().len(), 1);
  }

  // ── Adjustments ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn overdrawing_adjustment_is_conflict() {
    let state = make_state().await;
    let batch = receive(&state, "A-1", "2025-06-30", 5).await;
    let id = batch["batch_id"].as_str().unwrap();

    let (status, body) = send(
      &state,
      "POST",
      &format!("/batches/{id}/adjust"),
      Some("manager"),
      Some(json!({ "delta": -6, "reason": "breakage" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "consistency");

    let (status, body) = send(
      &state,
      "POST",
      &format!("/batches/{id}/adjust"),
      Some("manager"),
      Some(json!({ "delta": -2, "reason": "breakage" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["qty_on_hand_units"], 3);
  }

  #[tokio::test]
  async fn adjustment_without_delta_is_bad_request() {
    let state = make_state().await;
    let batch = receive(&state, "A-1", "2025-06-30", 5).await;
    let id = batch["batch_id"].as_str().unwrap();

    let (status, body) = send(
      &state,
      "POST",
      &format!("/batches/{id}/adjust"),
      Some("manager"),
      Some(json!({ "reason": "recount" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
  }

  // ── Dispensing ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn dispense_without_quantity_is_bad_request() {
    let state = make_state().await;
    receive(&state, "A-1", "2025-06-30", 5).await;

    let (status, body) = send(
      &state,
      "POST",
      "/dispense",
      Some("pharmacist-1"),
      Some(json!({ "pharmacy_id": "ph-1", "item_id": "amoxicillin-500", "reference": "rx-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
  }

  #[tokio::test]
  async fn shortfall_is_unprocessable_and_writes_nothing() {
    let state = make_state().await;
    let batch = receive(&state, "A-1", "2025-06-30", 5).await;
    let id = batch["batch_id"].as_str().unwrap();

    let (status, body) = send(
      &state,
      "POST",
      "/dispense",
      Some("pharmacist-1"),
      Some(json!({
        "pharmacy_id": "ph-1",
        "item_id": "amoxicillin-500",
        "quantity": 6,
        "reference": "rx-1",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_stock");

    let (_, history) = send(&state, "GET", &format!("/batches/{id}/history"), None, None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn dispense_receive_and_alert_flow() {
    let state = make_state().await;
    let a = receive(&state, "A", "2025-01-05", 50).await;
    let b = receive(&state, "B", "2025-03-01", 30).await;

    let (status, allocation) = send(
      &state,
      "POST",
      "/dispense",
      Some("pharmacist-1"),
      Some(json!({
        "pharmacy_id": "ph-1",
        "item_id": "amoxicillin-500",
        "quantity": 60,
        "reference": "rx-42",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{allocation}");
    let takes = allocation["takes"].as_array().unwrap();
    assert_eq!(takes.len(), 2);
    assert_eq!(takes[0]["batch_id"], a["batch_id"]);
    assert_eq!(takes[0]["quantity_taken"], 50);
    assert_eq!(takes[1]["batch_id"], b["batch_id"]);
    assert_eq!(takes[1]["quantity_taken"], 10);

    let b_id = b["batch_id"].as_str().unwrap();
    let (_, recon) = send(&state, "GET", &format!("/batches/{b_id}/reconcile"), None, None).await;
    assert_eq!(recon["consistent"], true);
    assert_eq!(recon["replayed_on_hand"], 20);

    let (status, _) = send(
      &state,
      "PUT",
      "/reorder-levels/ph-1/amoxicillin-500",
      Some("manager"),
      Some(json!({ "reorder_level": 25 })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, levels) = send(&state, "GET", "/reorder-levels/ph-1", None, None).await;
    assert_eq!(levels["amoxicillin-500"], 25);

    let (status, report) = send(&state, "GET", "/alerts?pharmacy_id=ph-1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["lookahead_days"], DEFAULT_LOOKAHEAD_DAYS);
    // A is empty, so only B can expire.
    let expiring = report["expiring_soon"].as_array().unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0]["batch_no"], "B");
    assert_eq!(expiring[0]["severity"], "info");
    let low = report["low_stock"].as_array().unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["total_stock"], 20);
    assert_eq!(low[0]["severity"], "warning");
    assert_eq!(report["fifo_warnings"].as_array().unwrap().len(), 0);
  }

  #[tokio::test]
  async fn alerts_honor_lookahead_override() {
    let state = make_state().await;
    receive(&state, "A", "2025-03-01", 10).await;

    let (_, wide) = send(&state, "GET", "/alerts?pharmacy_id=ph-1", None, None).await;
    assert_eq!(wide["expiring_soon"].as_array().unwrap().len(), 1);

    let (_, narrow) = send(&state, "GET", "/alerts?pharmacy_id=ph-1&days=30", None, None).await;
    assert_eq!(narrow["lookahead_days"], 30);
    assert_eq!(narrow["expiring_soon"].as_array().unwrap().len(), 0);
  }

  #[tokio::test]
  async fn alerts_require_pharmacy() {
    let state = make_state().await;
    let (status, _) = send(&state, "GET", "/alerts", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }
}
