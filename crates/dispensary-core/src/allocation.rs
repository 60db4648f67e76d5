//! FIFO dispense planning.
//!
//! Planning is pure: it sees a snapshot of batches and decides what to take
//! from each. The store runs the plan inside its write transaction, so the
//! snapshot it plans against is the one it commits against.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  batch::Batch,
  error::require,
  ledger::{MovementCause, NewEntry},
};

// ─── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispenseRequest {
  pub pharmacy_id: Option<String>,
  pub item_id:     Option<String>,
  pub quantity:    Option<i64>,
  /// Shared by every ledger entry the dispense writes.
  pub reference:   Option<String>,
  pub actor:       Option<String>,
  /// Draw from this batch only, bypassing FIFO order.
  pub batch_id:    Option<Uuid>,
}

impl DispenseRequest {
  pub fn new(
    pharmacy_id: impl Into<String>,
    item_id: impl Into<String>,
    quantity: i64,
    reference: impl Into<String>,
    actor: impl Into<String>,
  ) -> Self {
    Self {
      pharmacy_id: Some(pharmacy_id.into()),
      item_id: Some(item_id.into()),
      quantity: Some(quantity),
      reference: Some(reference.into()),
      actor: Some(actor.into()),
      batch_id: None,
    }
  }

  pub fn pinned_to(mut self, batch_id: Uuid) -> Self {
    self.batch_id = Some(batch_id);
    self
  }

  pub fn validate(&self) -> Result<ValidDispense> {
    let pharmacy_id = require("pharmacy_id", self.pharmacy_id.as_deref())?;
    let item_id = require("item_id", self.item_id.as_deref())?;
    let reference = require("reference", self.reference.as_deref())?;
    let actor = require("actor", self.actor.as_deref())?;
    let quantity = self
      .quantity
      .ok_or_else(|| Error::validation("quantity is required"))?;
    if quantity <= 0 {
      return Err(Error::validation("quantity must be positive"));
    }
    Ok(ValidDispense {
      pharmacy_id,
      item_id,
      quantity,
      reference,
      actor,
      batch_id: self.batch_id,
    })
  }
}

/// A dispense request whose required fields have been checked.
#[derive(Debug, Clone)]
pub struct ValidDispense {
  pub pharmacy_id: String,
  pub item_id:     String,
  pub quantity:    i64,
  pub reference:   String,
  pub actor:       String,
  pub batch_id:    Option<Uuid>,
}

// ─── Result ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Take {
  pub batch_id:       Uuid,
  pub batch_no:       String,
  pub quantity_taken: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
  pub pharmacy_id: String,
  pub item_id:     String,
  pub quantity:    i64,
  pub reference:   String,
  /// In draw order; quantities sum to `quantity`.
  pub takes:       Vec<Take>,
  /// Ids of the DISPENSE entries written, parallel to `takes`.
  pub entry_ids:   Vec<i64>,
}

// ─── Ordering ────────────────────────────────────────────────────────────────

/// FIFO order: dated batches before undated ones, earlier expiry first, then
/// earlier receipt, then batch id.
pub fn fifo_cmp(a: &Batch, b: &Batch) -> Ordering {
  let expiry = match (a.expiry_date, b.expiry_date) {
    (Some(x), Some(y)) => x.cmp(&y),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  };
  expiry
    .then_with(|| a.received_at.cmp(&b.received_at))
    .then_with(|| a.batch_id.cmp(&b.batch_id))
}

pub fn fifo_order(batches: &mut [Batch]) { batches.sort_by(fifo_cmp); }

// ─── Planning ────────────────────────────────────────────────────────────────

/// Decide what to take from each batch. Ineligible batches (inactive, empty,
/// or for another pharmacy/item) are ignored. Fails without side effects when
/// the eligible total is short.
pub fn plan(batches: &[Batch], request: &ValidDispense) -> Result<Vec<Take>> {
  let mut eligible: Vec<Batch> = batches
    .iter()
    .filter(|b| {
      b.is_available()
        && b.pharmacy_id == request.pharmacy_id
        && b.item_id == request.item_id
    })
    .cloned()
    .collect();

  if let Some(pinned) = request.batch_id {
    eligible.retain(|b| b.batch_id == pinned);
  }
  fifo_order(&mut eligible);

  // Saturates: a total past i64::MAX covers any request anyway.
  let available = eligible
    .iter()
    .fold(0i64, |acc, b| acc.saturating_add(b.qty_on_hand_units));
  if available < request.quantity {
    return Err(Error::InsufficientStock {
      requested: request.quantity,
      available,
    });
  }

  let mut remaining = request.quantity;
  let mut takes = Vec::new();
  for batch in eligible {
    if remaining == 0 {
      break;
    }
    let taken = remaining.min(batch.qty_on_hand_units);
    remaining -= taken;
    takes.push(Take {
      batch_id:       batch.batch_id,
      batch_no:       batch.batch_no,
      quantity_taken: taken,
    });
  }
  Ok(takes)
}

/// The DISPENSE entry for one take.
pub fn dispense_entry(take: &Take, request: &ValidDispense, now: DateTime<Utc>) -> NewEntry {
  NewEntry {
    batch_id:    take.batch_id,
    delta:       -take.quantity_taken,
    cause:       MovementCause::Dispense,
    reference:   request.reference.clone(),
    actor:       request.actor.clone(),
    note:        None,
    occurred_at: now,
  }
}
