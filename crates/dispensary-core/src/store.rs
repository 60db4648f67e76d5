//! The `InventoryStore` and `ItemCatalog` traits.
//!
//! Storage backends (e.g. `dispensary-store-sqlite`) implement these; the
//! HTTP layer depends only on the traits.

use std::{collections::HashMap, future::Future};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  allocation::{Allocation, DispenseRequest},
  batch::{Batch, BatchFilter, BatchPatch, NewBatch},
  ledger::{AdjustStock, LedgerEntry, LedgerHistory},
};

/// Backend errors that may carry a domain error from this crate.
///
/// Lets transports classify failures (validation vs. consistency vs. stock)
/// without knowing the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn domain(&self) -> Option<&crate::Error>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Batch store and movement ledger.
///
/// Every method that changes a quantity writes the ledger entry and the
/// cached on-hand quantity atomically. Implementations must serialise those
/// writes per batch so that the bounds check and the write cannot interleave
/// with another writer.
pub trait InventoryStore: Send + Sync {
  type Error: StoreError + From<crate::Error>;

  // ── Batches ───────────────────────────────────────────────────────────

  /// Receive a batch: validate, persist, and append its RECEIPT entry.
  fn create_batch(
    &self,
    input: NewBatch,
    actor: String,
  ) -> impl Future<Output = Result<Batch, Self::Error>> + Send + '_;

  /// Retrieve a batch by id, active or not.
  fn get_batch(
    &self,
    batch_id: Uuid,
  ) -> impl Future<Output = Result<Option<Batch>, Self::Error>> + Send + '_;

  /// Batches of one pharmacy, ordered by receipt time. An empty
  /// `pharmacy_id` is a validation error; there is no cross-pharmacy listing.
  fn list_batches(
    &self,
    pharmacy_id: String,
    filter: BatchFilter,
  ) -> impl Future<Output = Result<Vec<Batch>, Self::Error>> + Send + '_;

  /// Correct non-quantity fields.
  fn update_batch(
    &self,
    batch_id: Uuid,
    patch: BatchPatch,
  ) -> impl Future<Output = Result<Batch, Self::Error>> + Send + '_;

  /// Soft-delete. The batch and its ledger stay readable.
  fn deactivate(
    &self,
    batch_id: Uuid,
  ) -> impl Future<Output = Result<Batch, Self::Error>> + Send + '_;

  // ── Ledger writes ─────────────────────────────────────────────────────

  /// Append a manual ADJUSTMENT or RETURN entry.
  fn adjust_stock(
    &self,
    batch_id: Uuid,
    adjustment: AdjustStock,
  ) -> impl Future<Output = Result<Batch, Self::Error>> + Send + '_;

  /// FIFO dispense across batches, all-or-nothing.
  fn dispense(
    &self,
    request: DispenseRequest,
  ) -> impl Future<Output = Result<Allocation, Self::Error>> + Send + '_;

  // ── Ledger reads ──────────────────────────────────────────────────────

  /// Up to `limit` entries of `batch_id` with `entry_id > after`, ascending.
  fn history_page(
    &self,
    batch_id: Uuid,
    after: Option<i64>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;

  /// All entries of a pharmacy, ascending, optionally since a point in time.
  fn pharmacy_movements(
    &self,
    pharmacy_id: String,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;

  /// Entries of the pharmacy's active batches, ascending, restricted to
  /// items with more than one active batch. This is all the FIFO-warning
  /// replay needs: a lone batch has nothing to be out of order with.
  fn fifo_movements(
    &self,
    pharmacy_id: String,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;

  /// Lazy walk over the full history of a batch.
  fn history(&self, batch_id: Uuid) -> LedgerHistory<'_, Self> {
    LedgerHistory::new(self, batch_id)
  }
}

/// Per-item reorder thresholds, supplied by the item catalog.
pub trait ItemCatalog: Send + Sync {
  type Error: StoreError + From<crate::Error>;

  /// Reorder levels of every catalogued item at a pharmacy.
  fn reorder_levels(
    &self,
    pharmacy_id: String,
  ) -> impl Future<Output = Result<HashMap<String, i64>, Self::Error>> + Send + '_;

  fn set_reorder_level(
    &self,
    pharmacy_id: String,
    item_id: String,
    level: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
