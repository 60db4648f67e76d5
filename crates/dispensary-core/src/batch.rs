//! Batch types: one received lot of one item at one pharmacy.
//!
//! Quantities on a [`Batch`] are never written directly. `qty_on_hand_units`
//! is a cache of the ledger sum and only moves through a ledger append; the
//! patch type below deliberately has no quantity fields.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{Error, Result, error::require};

// ─── Money ───────────────────────────────────────────────────────────────────

/// A non-negative monetary amount in minor units (e.g. cents).
///
/// Informational only: the engine stores prices but never computes with them.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
  fn validate(self, field: &str) -> Result<Self> {
    if self.0 < 0 {
      return Err(Error::validation(format!("{field} must not be negative")));
    }
    Ok(self)
  }
}

// ─── Batch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
  pub batch_id:            Uuid,
  pub pharmacy_id:         String,
  pub item_id:             String,
  pub supplier_id:         String,
  pub batch_no:            String,
  pub expiry_date:         Option<NaiveDate>,
  pub qty_received_units:  i64,
  pub qty_on_hand_units:   i64,
  pub purchase_unit_price: Option<Money>,
  pub sale_unit_price:     Option<Money>,
  pub notes:               Option<String>,
  pub received_at:         DateTime<Utc>,
  pub active:              bool,
}

impl Batch {
  /// Whether the batch can be drawn from by the allocator.
  pub fn is_available(&self) -> bool { self.active && self.qty_on_hand_units > 0 }
}

// ─── Receipt input ───────────────────────────────────────────────────────────

/// Input to a batch receipt. Required fields are `Option` so that a missing
/// field surfaces as a validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBatch {
  pub pharmacy_id:         Option<String>,
  pub item_id:             Option<String>,
  pub supplier_id:         Option<String>,
  pub batch_no:            Option<String>,
  pub expiry_date:         Option<NaiveDate>,
  pub qty_received_units:  Option<i64>,
  pub purchase_unit_price: Option<Money>,
  pub sale_unit_price:     Option<Money>,
  pub notes:               Option<String>,
  /// Back-dated receipt time; defaults to now.
  pub received_at:         Option<DateTime<Utc>>,
}

impl NewBatch {
  /// Convenience constructor for the required fields.
  pub fn new(
    pharmacy_id: impl Into<String>,
    item_id: impl Into<String>,
    supplier_id: impl Into<String>,
    batch_no: impl Into<String>,
    qty_received_units: i64,
  ) -> Self {
    Self {
      pharmacy_id: Some(pharmacy_id.into()),
      item_id: Some(item_id.into()),
      supplier_id: Some(supplier_id.into()),
      batch_no: Some(batch_no.into()),
      qty_received_units: Some(qty_received_units),
      ..Self::default()
    }
  }

  pub fn expiring(mut self, date: NaiveDate) -> Self {
    self.expiry_date = Some(date);
    self
  }

  pub fn received(mut self, at: DateTime<Utc>) -> Self {
    self.received_at = Some(at);
    self
  }

  /// Validate and materialise the batch. On-hand starts equal to received;
  /// the caller is responsible for writing the matching RECEIPT entry.
  pub fn into_batch(self, batch_id: Uuid, now: DateTime<Utc>) -> Result<Batch> {
    let pharmacy_id = require("pharmacy_id", self.pharmacy_id.as_deref())?;
    let item_id = require("item_id", self.item_id.as_deref())?;
    let supplier_id = require("supplier_id", self.supplier_id.as_deref())?;
    let batch_no = require("batch_no", self.batch_no.as_deref())?;

    let qty = match self.qty_received_units {
      Some(q) if q > 0 => q,
      Some(_) => {
        return Err(Error::validation("qty_received_units must be positive"));
      }
      None => return Err(Error::validation("qty_received_units is required")),
    };

    let purchase_unit_price = self
      .purchase_unit_price
      .map(|m| m.validate("purchase_unit_price"))
      .transpose()?;
    let sale_unit_price = self
      .sale_unit_price
      .map(|m| m.validate("sale_unit_price"))
      .transpose()?;

    Ok(Batch {
      batch_id,
      pharmacy_id,
      item_id,
      supplier_id,
      batch_no,
      expiry_date: self.expiry_date,
      qty_received_units: qty,
      qty_on_hand_units: qty,
      purchase_unit_price,
      sale_unit_price,
      notes: self.notes,
      received_at: self.received_at.unwrap_or(now),
      active: true,
    })
  }
}

// ─── Partial update ──────────────────────────────────────────────────────────

/// Non-quantity fields that may be corrected after receipt.
///
/// `expiry_date` and `notes` are optional on the batch itself, so they take
/// two levels: an absent field is left alone, while an explicit JSON `null`
/// (`Some(None)`) clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchPatch {
  pub supplier_id:         Option<String>,
  pub batch_no:            Option<String>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub expiry_date:         Option<Option<NaiveDate>>,
  pub purchase_unit_price: Option<Money>,
  pub sale_unit_price:     Option<Money>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub notes:               Option<Option<String>>,
}

/// A field that is present in the input, possibly as `null`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

impl BatchPatch {
  /// Apply the patch to `batch` in place.
  pub fn apply(self, batch: &mut Batch) -> Result<()> {
    if let Some(s) = self.supplier_id {
      batch.supplier_id = require("supplier_id", Some(s.as_str()))?;
    }
    if let Some(b) = self.batch_no {
      batch.batch_no = require("batch_no", Some(b.as_str()))?;
    }
    if let Some(d) = self.expiry_date {
      batch.expiry_date = d;
    }
    if let Some(p) = self.purchase_unit_price {
      batch.purchase_unit_price = Some(p.validate("purchase_unit_price")?);
    }
    if let Some(p) = self.sale_unit_price {
      batch.sale_unit_price = Some(p.validate("sale_unit_price")?);
    }
    if let Some(n) = self.notes {
      batch.notes = n;
    }
    Ok(())
  }
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Optional filters for [`InventoryStore::list_batches`](crate::store::InventoryStore::list_batches).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchFilter {
  pub item_id:          Option<String>,
  /// Also return deactivated batches.
  #[serde(default)]
  pub include_inactive: bool,
}

impl BatchFilter {
  pub fn item(item_id: impl Into<String>) -> Self {
    Self { item_id: Some(item_id.into()), include_inactive: false }
  }

  pub fn matches(&self, batch: &Batch) -> bool {
    (self.include_inactive || batch.active)
      && self.item_id.as_deref().is_none_or(|i| i == batch.item_id)
  }
}

/// Default listing order: receipt time, then id.
pub fn sort_by_receipt(batches: &mut [Batch]) {
  batches.sort_by(|a, b| {
    a.received_at
      .cmp(&b.received_at)
      .then_with(|| a.batch_id.cmp(&b.batch_id))
  });
}
