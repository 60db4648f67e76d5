//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that string comparison in SQL matches chronological order. Dates are
//! `YYYY-MM-DD`. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use dispensary_core::{
  batch::{Batch, Money},
  ledger::{LedgerEntry, MovementCause},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn decode_cause(s: &str) -> Result<MovementCause> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown movement cause: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawBatch::from_row`].
pub const BATCH_COLUMNS: &str = "batch_id, pharmacy_id, item_id, supplier_id, batch_no, \
   expiry_date, qty_received_units, qty_on_hand_units, purchase_unit_price, \
   sale_unit_price, notes, received_at, active";

/// Raw values read directly from a `batches` row.
pub struct RawBatch {
  pub batch_id:            String,
  pub pharmacy_id:         String,
  pub item_id:             String,
  pub supplier_id:         String,
  pub batch_no:            String,
  pub expiry_date:         Option<String>,
  pub qty_received_units:  i64,
  pub qty_on_hand_units:   i64,
  pub purchase_unit_price: Option<i64>,
  pub sale_unit_price:     Option<i64>,
  pub notes:               Option<String>,
  pub received_at:         String,
  pub active:              bool,
}

impl RawBatch {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      batch_id:            row.get(0)?,
      pharmacy_id:         row.get(1)?,
      item_id:             row.get(2)?,
      supplier_id:         row.get(3)?,
      batch_no:            row.get(4)?,
      expiry_date:         row.get(5)?,
      qty_received_units:  row.get(6)?,
      qty_on_hand_units:   row.get(7)?,
      purchase_unit_price: row.get(8)?,
      sale_unit_price:     row.get(9)?,
      notes:               row.get(10)?,
      received_at:         row.get(11)?,
      active:              row.get(12)?,
    })
  }

  pub fn into_batch(self) -> Result<Batch> {
    Ok(Batch {
      batch_id:            decode_uuid(&self.batch_id)?,
      pharmacy_id:         self.pharmacy_id,
      item_id:             self.item_id,
      supplier_id:         self.supplier_id,
      batch_no:            self.batch_no,
      expiry_date:         self.expiry_date.as_deref().map(decode_date).transpose()?,
      qty_received_units:  self.qty_received_units,
      qty_on_hand_units:   self.qty_on_hand_units,
      purchase_unit_price: self.purchase_unit_price.map(Money),
      sale_unit_price:     self.sale_unit_price.map(Money),
      notes:               self.notes,
      received_at:         decode_dt(&self.received_at)?,
      active:              self.active,
    })
  }
}

/// Column list matching [`RawEntry::from_row`].
pub const ENTRY_COLUMNS: &str = "entry_id, batch_id, pharmacy_id, item_id, delta, cause, \
   reference, actor, note, occurred_at";

/// Raw values read directly from a `ledger` row.
pub struct RawEntry {
  pub entry_id:    i64,
  pub batch_id:    String,
  pub pharmacy_id: String,
  pub item_id:     String,
  pub delta:       i64,
  pub cause:       String,
  pub reference:   String,
  pub actor:       String,
  pub note:        Option<String>,
  pub occurred_at: String,
}

impl RawEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:    row.get(0)?,
      batch_id:    row.get(1)?,
      pharmacy_id: row.get(2)?,
      item_id:     row.get(3)?,
      delta:       row.get(4)?,
      cause:       row.get(5)?,
      reference:   row.get(6)?,
      actor:       row.get(7)?,
      note:        row.get(8)?,
      occurred_at: row.get(9)?,
    })
  }

  pub fn into_entry(self) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
      entry_id:    self.entry_id,
      batch_id:    decode_uuid(&self.batch_id)?,
      pharmacy_id: self.pharmacy_id,
      item_id:     self.item_id,
      delta:       self.delta,
      cause:       decode_cause(&self.cause)?,
      reference:   self.reference,
      actor:       self.actor,
      note:        self.note,
      occurred_at: decode_dt(&self.occurred_at)?,
    })
  }
}
