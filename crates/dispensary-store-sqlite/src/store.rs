//! [`SqliteStore`], the SQLite implementation of [`InventoryStore`] and
//! [`ItemCatalog`].
//!
//! All statements run on the single `tokio-rusqlite` connection thread, one
//! closure per operation. Writers open a `BEGIN IMMEDIATE` transaction, so
//! the bounds check in [`apply_delta`] and the write it guards are never
//! split by another writer, in this process or any other.

use std::{collections::HashMap, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use dispensary_core::{
  allocation::{self, Allocation, DispenseRequest, ValidDispense},
  batch::{self, Batch, BatchFilter, BatchPatch, NewBatch},
  clock::{Clock, SystemClock},
  error::require,
  ledger::{AdjustStock, LedgerEntry, MovementCause, NewEntry, apply_delta},
  store::{InventoryStore, ItemCatalog},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{BATCH_COLUMNS, ENTRY_COLUMNS, RawBatch, RawEntry, encode_date, encode_dt, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An inventory store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted, and clones
/// share the same writer thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Replace the time source used to stamp receipts and ledger entries.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, clock: Arc::new(SystemClock) })
  }

  /// Run `f` on the connection thread, keeping its error type intact.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

// ─── Statement helpers ───────────────────────────────────────────────────────

fn load_batch(conn: &Connection, batch_id: Uuid) -> Result<Option<Batch>> {
  let raw = conn
    .query_row(
      &format!("SELECT {BATCH_COLUMNS} FROM batches WHERE batch_id = ?1"),
      rusqlite::params![encode_uuid(batch_id)],
      RawBatch::from_row,
    )
    .optional()?;
  raw.map(RawBatch::into_batch).transpose()
}

fn require_batch(conn: &Connection, batch_id: Uuid) -> Result<Batch> {
  load_batch(conn, batch_id)?.ok_or_else(|| dispensary_core::Error::BatchNotFound(batch_id).into())
}

fn insert_batch(conn: &Connection, b: &Batch) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO batches ({BATCH_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ),
    rusqlite::params![
      encode_uuid(b.batch_id),
      b.pharmacy_id,
      b.item_id,
      b.supplier_id,
      b.batch_no,
      b.expiry_date.map(encode_date),
      b.qty_received_units,
      b.qty_on_hand_units,
      b.purchase_unit_price.map(|m| m.0),
      b.sale_unit_price.map(|m| m.0),
      b.notes,
      encode_dt(b.received_at),
      b.active,
    ],
  )?;
  Ok(())
}

fn update_batch_fields(conn: &Connection, b: &Batch) -> Result<()> {
  conn.execute(
    "UPDATE batches SET
       supplier_id = ?2, batch_no = ?3, expiry_date = ?4,
       purchase_unit_price = ?5, sale_unit_price = ?6, notes = ?7, active = ?8
     WHERE batch_id = ?1",
    rusqlite::params![
      encode_uuid(b.batch_id),
      b.supplier_id,
      b.batch_no,
      b.expiry_date.map(encode_date),
      b.purchase_unit_price.map(|m| m.0),
      b.sale_unit_price.map(|m| m.0),
      b.notes,
      b.active,
    ],
  )?;
  Ok(())
}

/// Write an entry row without touching the batch's cached quantity.
fn insert_entry(conn: &Connection, b: &Batch, entry: NewEntry) -> Result<LedgerEntry> {
  conn.execute(
    "INSERT INTO ledger (
       batch_id, pharmacy_id, item_id, delta, cause, reference, actor, note, occurred_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      encode_uuid(entry.batch_id),
      b.pharmacy_id,
      b.item_id,
      entry.delta,
      entry.cause.to_string(),
      entry.reference,
      entry.actor,
      entry.note,
      encode_dt(entry.occurred_at),
    ],
  )?;
  Ok(entry.into_entry(conn.last_insert_rowid(), b))
}

/// The ledger append: bounds-check, move the cached quantity, write the
/// entry. Callers hold a write transaction.
fn append(conn: &Connection, b: &mut Batch, entry: NewEntry) -> Result<LedgerEntry> {
  debug_assert_eq!(entry.batch_id, b.batch_id);
  let next = apply_delta(b, entry.delta)?;
  conn.execute(
    "UPDATE batches SET qty_on_hand_units = ?2 WHERE batch_id = ?1",
    rusqlite::params![encode_uuid(b.batch_id), next],
  )?;
  b.qty_on_hand_units = next;
  insert_entry(conn, b, entry)
}

fn query_batches<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Batch>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params, RawBatch::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawBatch::into_batch).collect()
}

fn query_entries<P: rusqlite::Params>(
  conn: &Connection,
  sql: &str,
  params: P,
) -> Result<Vec<LedgerEntry>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params, RawEntry::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEntry::into_entry).collect()
}

// ─── Operations ──────────────────────────────────────────────────────────────

fn receive(conn: &mut Connection, input: NewBatch, actor: String, now: DateTime<Utc>) -> Result<Batch> {
  let actor = require("actor", Some(actor.as_str()))?;
  let batch = input.into_batch(Uuid::now_v7(), now)?;

  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  insert_batch(&tx, &batch)?;
  let receipt = NewEntry {
    batch_id:    batch.batch_id,
    delta:       batch.qty_received_units,
    cause:       MovementCause::Receipt,
    reference:   encode_uuid(batch.batch_id),
    actor,
    note:        None,
    occurred_at: now,
  };
  insert_entry(&tx, &batch, receipt)?;
  tx.commit()?;
  Ok(batch)
}

fn dispense(conn: &mut Connection, request: ValidDispense, now: DateTime<Utc>) -> Result<Allocation> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  if let Some(pinned) = request.batch_id {
    let b = require_batch(&tx, pinned)?;
    if b.pharmacy_id != request.pharmacy_id || b.item_id != request.item_id {
      return Err(dispensary_core::Error::validation(format!(
        "batch {pinned} does not hold {} at pharmacy {}",
        request.item_id, request.pharmacy_id
      ))
      .into());
    }
    if !b.active {
      return Err(dispensary_core::Error::validation(format!("batch {pinned} is inactive")).into());
    }
  }

  let mut eligible = query_batches(
    &tx,
    &format!(
      "SELECT {BATCH_COLUMNS} FROM batches
       WHERE pharmacy_id = ?1 AND item_id = ?2 AND active = 1 AND qty_on_hand_units > 0"
    ),
    rusqlite::params![request.pharmacy_id, request.item_id],
  )?;

  // Dropping `tx` on the error path rolls back; nothing has been written yet.
  let takes = allocation::plan(&eligible, &request)?;

  if let Some(pinned) = request.batch_id {
    allocation::fifo_order(&mut eligible);
    if let Some(first) = eligible.first().filter(|b| b.batch_id != pinned) {
      tracing::warn!(
        pinned_batch = %pinned,
        fifo_batch = %first.batch_id,
        fifo_batch_no = %first.batch_no,
        item_id = %request.item_id,
        "dispense pinned to a batch out of FIFO order"
      );
    }
  }

  let mut entry_ids = Vec::with_capacity(takes.len());
  for take in &takes {
    let b = eligible
      .iter_mut()
      .find(|b| b.batch_id == take.batch_id)
      .ok_or(dispensary_core::Error::BatchNotFound(take.batch_id))?;
    let entry = append(&tx, b, allocation::dispense_entry(take, &request, now))?;
    entry_ids.push(entry.entry_id);
  }
  tx.commit()?;

  Ok(Allocation {
    pharmacy_id: request.pharmacy_id,
    item_id: request.item_id,
    quantity: request.quantity,
    reference: request.reference,
    takes,
    entry_ids,
  })
}

fn adjust(
  conn: &mut Connection,
  batch_id: Uuid,
  adjustment: AdjustStock,
  now: DateTime<Utc>,
) -> Result<(Batch, LedgerEntry)> {
  let entry = adjustment.into_entry(batch_id, now)?;
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut b = require_batch(&tx, batch_id)?;
  let written = append(&tx, &mut b, entry)?;
  tx.commit()?;
  Ok((b, written))
}

fn patch(conn: &mut Connection, batch_id: Uuid, patch: BatchPatch) -> Result<Batch> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut b = require_batch(&tx, batch_id)?;
  patch.apply(&mut b)?;
  update_batch_fields(&tx, &b)?;
  tx.commit()?;
  Ok(b)
}

fn deactivate(conn: &mut Connection, batch_id: Uuid) -> Result<Batch> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut b = require_batch(&tx, batch_id)?;
  if b.active {
    b.active = false;
    update_batch_fields(&tx, &b)?;
  }
  tx.commit()?;
  Ok(b)
}

// ─── InventoryStore impl ─────────────────────────────────────────────────────

impl InventoryStore for SqliteStore {
  type Error = Error;

  // ── Batches ───────────────────────────────────────────────────────────────

  async fn create_batch(&self, input: NewBatch, actor: String) -> Result<Batch> {
    let now = self.clock.now();
    let batch = self.run(move |conn| receive(conn, input, actor, now)).await?;
    tracing::info!(
      batch_id = %batch.batch_id,
      pharmacy_id = %batch.pharmacy_id,
      item_id = %batch.item_id,
      batch_no = %batch.batch_no,
      qty = batch.qty_received_units,
      "batch received"
    );
    Ok(batch)
  }

  async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>> {
    self.run(move |conn| load_batch(conn, batch_id)).await
  }

  async fn list_batches(&self, pharmacy_id: String, filter: BatchFilter) -> Result<Vec<Batch>> {
    let pharmacy_id = require("pharmacy_id", Some(pharmacy_id.as_str()))?;
    tracing::debug!(%pharmacy_id, ?filter, "listing batches");

    let mut batches = self
      .run(move |conn| {
        query_batches(
          conn,
          &format!(
            "SELECT {BATCH_COLUMNS} FROM batches
             WHERE pharmacy_id = ?1
               AND (?2 IS NULL OR item_id = ?2)
               AND (?3 OR active = 1)"
          ),
          rusqlite::params![pharmacy_id, filter.item_id, filter.include_inactive],
        )
      })
      .await?;
    batch::sort_by_receipt(&mut batches);
    Ok(batches)
  }

  async fn update_batch(&self, batch_id: Uuid, changes: BatchPatch) -> Result<Batch> {
    let b = self.run(move |conn| patch(conn, batch_id, changes)).await?;
    tracing::info!(batch_id = %b.batch_id, "batch updated");
    Ok(b)
  }

  async fn deactivate(&self, batch_id: Uuid) -> Result<Batch> {
    let b = self.run(move |conn| deactivate(conn, batch_id)).await?;
    tracing::info!(batch_id = %b.batch_id, on_hand = b.qty_on_hand_units, "batch deactivated");
    Ok(b)
  }

  // ── Ledger writes ─────────────────────────────────────────────────────────

  async fn adjust_stock(&self, batch_id: Uuid, adjustment: AdjustStock) -> Result<Batch> {
    let now = self.clock.now();
    let (b, entry) = self.run(move |conn| adjust(conn, batch_id, adjustment, now)).await?;
    tracing::info!(
      batch_id = %b.batch_id,
      entry_id = entry.entry_id,
      delta = entry.delta,
      cause = %entry.cause,
      actor = %entry.actor,
      on_hand = b.qty_on_hand_units,
      "stock adjusted"
    );
    Ok(b)
  }

  async fn dispense(&self, request: DispenseRequest) -> Result<Allocation> {
    let request = request.validate()?;
    let now = self.clock.now();
    let allocation = self.run(move |conn| dispense(conn, request, now)).await?;
    tracing::info!(
      pharmacy_id = %allocation.pharmacy_id,
      item_id = %allocation.item_id,
      quantity = allocation.quantity,
      reference = %allocation.reference,
      batches = allocation.takes.len(),
      "dispensed"
    );
    Ok(allocation)
  }

  // ── Ledger reads ──────────────────────────────────────────────────────────

  async fn history_page(
    &self,
    batch_id: Uuid,
    after: Option<i64>,
    limit: usize,
  ) -> Result<Vec<LedgerEntry>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    self
      .run(move |conn| {
        query_entries(
          conn,
          &format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger
             WHERE batch_id = ?1 AND entry_id > ?2
             ORDER BY entry_id
             LIMIT ?3"
          ),
          rusqlite::params![encode_uuid(batch_id), after.unwrap_or(0), limit],
        )
      })
      .await
  }

  async fn pharmacy_movements(
    &self,
    pharmacy_id: String,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<LedgerEntry>> {
    let pharmacy_id = require("pharmacy_id", Some(pharmacy_id.as_str()))?;
    let since = since.map(encode_dt);
    self
      .run(move |conn| {
        query_entries(
          conn,
          &format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger
             WHERE pharmacy_id = ?1 AND (?2 IS NULL OR occurred_at >= ?2)
             ORDER BY entry_id"
          ),
          rusqlite::params![pharmacy_id, since],
        )
      })
      .await
  }

  async fn fifo_movements(&self, pharmacy_id: String) -> Result<Vec<LedgerEntry>> {
    let pharmacy_id = require("pharmacy_id", Some(pharmacy_id.as_str()))?;
    self
      .run(move |conn| {
        query_entries(
          conn,
          &format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger
             WHERE pharmacy_id = ?1
               AND batch_id IN (
                 SELECT batch_id FROM batches WHERE pharmacy_id = ?1 AND active = 1
               )
               AND item_id IN (
                 SELECT item_id FROM batches WHERE pharmacy_id = ?1 AND active = 1
                 GROUP BY item_id HAVING COUNT(*) > 1
               )
             ORDER BY entry_id"
          ),
          rusqlite::params![pharmacy_id],
        )
      })
      .await
  }
}

// ─── ItemCatalog impl ────────────────────────────────────────────────────────

impl ItemCatalog for SqliteStore {
  type Error = Error;

  async fn reorder_levels(&self, pharmacy_id: String) -> Result<HashMap<String, i64>> {
    self
      .run(move |conn| {
        let mut stmt = conn
          .prepare("SELECT item_id, reorder_level FROM reorder_levels WHERE pharmacy_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![pharmacy_id], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<HashMap<String, i64>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn set_reorder_level(&self, pharmacy_id: String, item_id: String, level: i64) -> Result<()> {
    let pharmacy_id = require("pharmacy_id", Some(pharmacy_id.as_str()))?;
    let item_id = require("item_id", Some(item_id.as_str()))?;
    if level < 0 {
      return Err(dispensary_core::Error::validation("reorder_level must not be negative").into());
    }
    tracing::info!(%pharmacy_id, %item_id, level, "reorder level set");
    self
      .run(move |conn| {
        conn.execute(
          "INSERT INTO reorder_levels (pharmacy_id, item_id, reorder_level) VALUES (?1, ?2, ?3)
           ON CONFLICT (pharmacy_id, item_id) DO UPDATE SET reorder_level = excluded.reorder_level",
          rusqlite::params![pharmacy_id, item_id, level],
        )?;
        Ok(())
      })
      .await
  }
}
