//! The movement ledger: every change to a batch's on-hand quantity.
//!
//! Entries are immutable. Corrections are new compensating entries, never
//! edits. Replaying every entry of a batch yields its on-hand quantity; the
//! RECEIPT entry written at creation contributes the received quantity.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, batch::Batch, error::require, store::InventoryStore};

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementCause {
  Receipt,
  Dispense,
  Adjustment,
  Return,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
  /// Store-assigned, strictly increasing.
  pub entry_id:    i64,
  pub batch_id:    Uuid,
  pub pharmacy_id: String,
  pub item_id:     String,
  pub delta:       i64,
  pub cause:       MovementCause,
  /// Id of the triggering business event (dispense transaction, receipt...).
  pub reference:   String,
  pub actor:       String,
  pub note:        Option<String>,
  pub occurred_at: DateTime<Utc>,
}

/// An entry before the store has assigned its id.
#[derive(Debug, Clone)]
pub struct NewEntry {
  pub batch_id:    Uuid,
  pub delta:       i64,
  pub cause:       MovementCause,
  pub reference:   String,
  pub actor:       String,
  pub note:        Option<String>,
  pub occurred_at: DateTime<Utc>,
}

impl NewEntry {
  pub fn into_entry(self, entry_id: i64, batch: &Batch) -> LedgerEntry {
    LedgerEntry {
      entry_id,
      batch_id: self.batch_id,
      pharmacy_id: batch.pharmacy_id.clone(),
      item_id: batch.item_id.clone(),
      delta: self.delta,
      cause: self.cause,
      reference: self.reference,
      actor: self.actor,
      note: self.note,
      occurred_at: self.occurred_at,
    }
  }
}

// ─── Invariant ───────────────────────────────────────────────────────────────

/// Compute the on-hand quantity after applying `delta` to `batch`.
///
/// This is the single check guarding `0 <= on_hand <= received`; every append
/// path runs it inside the same transaction that writes the entry.
pub fn apply_delta(batch: &Batch, delta: i64) -> Result<i64> {
  let consistency = || Error::Consistency {
    batch_id: batch.batch_id,
    on_hand:  batch.qty_on_hand_units,
    received: batch.qty_received_units,
    delta,
  };
  let next = batch.qty_on_hand_units.checked_add(delta).ok_or_else(consistency)?;
  if next < 0 || next > batch.qty_received_units {
    return Err(consistency());
  }
  Ok(next)
}

/// Sum of all deltas, i.e. the ledger-derived on-hand quantity.
pub fn replay<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> i64 {
  entries.into_iter().map(|e| e.delta).sum()
}

// ─── Manual adjustment ───────────────────────────────────────────────────────

/// A manual stock correction or a customer return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStock {
  pub delta:  Option<i64>,
  /// `ADJUSTMENT` (default) or `RETURN`.
  pub cause:  Option<MovementCause>,
  pub reason: Option<String>,
  pub actor:  Option<String>,
}

impl AdjustStock {
  pub fn new(delta: i64, reason: impl Into<String>, actor: impl Into<String>) -> Self {
    Self {
      delta: Some(delta),
      cause: None,
      reason: Some(reason.into()),
      actor: Some(actor.into()),
    }
  }

  /// Validate and turn into a ledger entry for `batch_id`.
  pub fn into_entry(self, batch_id: Uuid, now: DateTime<Utc>) -> Result<NewEntry> {
    let delta = self.delta.ok_or_else(|| Error::validation("delta is required"))?;
    let cause = self.cause.unwrap_or(MovementCause::Adjustment);
    match cause {
      MovementCause::Adjustment => {}
      MovementCause::Return if delta > 0 => {}
      MovementCause::Return => {
        return Err(Error::validation("a return must have a positive delta"));
      }
      other => {
        return Err(Error::validation(format!(
          "{other} entries cannot be written through an adjustment"
        )));
      }
    }
    if delta == 0 {
      return Err(Error::validation("delta must be non-zero"));
    }
    let reason = require("reason", self.reason.as_deref())?;
    let actor = require("actor", self.actor.as_deref())?;

    Ok(NewEntry {
      batch_id,
      delta,
      cause,
      reference: Uuid::new_v4().to_string(),
      actor,
      note: Some(reason),
      occurred_at: now,
    })
  }
}

// ─── History cursor ──────────────────────────────────────────────────────────

const PAGE_SIZE: usize = 256;

/// Lazy, finite, restartable walk over one batch's entries in ascending
/// `entry_id` order. Entries are fetched from the store a page at a time.
pub struct LedgerHistory<'a, S: ?Sized> {
  store:     &'a S,
  batch_id:  Uuid,
  page_size: usize,
  after:     Option<i64>,
  buffer:    VecDeque<LedgerEntry>,
  exhausted: bool,
}

impl<'a, S: InventoryStore + ?Sized> LedgerHistory<'a, S> {
  pub fn new(store: &'a S, batch_id: Uuid) -> Self {
    Self::with_page_size(store, batch_id, PAGE_SIZE)
  }

  pub fn with_page_size(store: &'a S, batch_id: Uuid, page_size: usize) -> Self {
    Self {
      store,
      batch_id,
      page_size: page_size.max(1),
      after: None,
      buffer: VecDeque::new(),
      exhausted: false,
    }
  }

  pub async fn next(&mut self) -> Result<Option<LedgerEntry>, S::Error> {
    if self.buffer.is_empty() && !self.exhausted {
      let page = self
        .store
        .history_page(self.batch_id, self.after, self.page_size)
        .await?;
      if page.len() < self.page_size {
        self.exhausted = true;
      }
      if let Some(last) = page.last() {
        self.after = Some(last.entry_id);
      }
      self.buffer.extend(page);
    }
    Ok(self.buffer.pop_front())
  }

  /// Start again from the first entry.
  pub fn rewind(&mut self) {
    self.after = None;
    self.buffer.clear();
    self.exhausted = false;
  }

  pub async fn collect(mut self) -> Result<Vec<LedgerEntry>, S::Error> {
    let mut out = Vec::new();
    while let Some(entry) = self.next().await? {
      out.push(entry);
    }
    Ok(out)
  }
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

/// Result of replaying a batch's ledger against its cached quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
  pub batch_id:         Uuid,
  pub qty_received:     i64,
  pub cached_on_hand:   i64,
  pub replayed_on_hand: i64,
  pub entries:          usize,
  pub consistent:       bool,
}

/// Replay the ledger of `batch_id` and compare with the cached on-hand.
pub async fn reconcile<S>(store: &S, batch_id: Uuid) -> Result<Reconciliation, S::Error>
where
  S: InventoryStore + ?Sized,
{
  let batch = store
    .get_batch(batch_id)
    .await?
    .ok_or(Error::BatchNotFound(batch_id))?;

  let mut history = store.history(batch_id);
  let mut replayed = 0i64;
  let mut entries = 0usize;
  let mut in_bounds = true;
  while let Some(entry) = history.next().await? {
    replayed = replayed.saturating_add(entry.delta);
    entries += 1;
    in_bounds &= (0..=batch.qty_received_units).contains(&replayed);
  }

  Ok(Reconciliation {
    batch_id,
    qty_received: batch.qty_received_units,
    cached_on_hand: batch.qty_on_hand_units,
    replayed_on_hand: replayed,
    entries,
    consistent: in_bounds && replayed == batch.qty_on_hand_units,
  })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use proptest::prelude::*;

  use super::*;
  use crate::batch::NewBatch;

  fn batch(received: i64) -> Batch {
    NewBatch::new("ph-1", "ibuprofen", "sup-1", "LOT-1", received)
      .into_batch(Uuid::nil(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
      .unwrap()
  }

  #[test]
  fn overdraw_is_a_consistency_error() {
    let b = batch(10);
    assert_eq!(apply_delta(&b, -10).unwrap(), 0);
    let err = apply_delta(&b, -11).unwrap_err();
    assert!(matches!(err, Error::Consistency { on_hand: 10, delta: -11, .. }));
  }

  #[test]
  fn overfill_is_a_consistency_error() {
    let mut b = batch(10);
    b.qty_on_hand_units = 4;
    assert_eq!(apply_delta(&b, 6).unwrap(), 10);
    assert!(matches!(apply_delta(&b, 7), Err(Error::Consistency { .. })));
  }

  #[test]
  fn cause_round_trips_through_strings() {
    assert_eq!(MovementCause::Dispense.to_string(), "DISPENSE");
    assert_eq!("RETURN".parse::<MovementCause>().unwrap(), MovementCause::Return);
    assert!("LOSS".parse::<MovementCause>().is_err());
  }

  #[test]
  fn adjustment_requires_reason_and_actor() {
    let now = Utc::now();
    let mut adj = AdjustStock::new(-2, "breakage", "nurse-1");
    adj.reason = None;
    assert!(matches!(adj.into_entry(Uuid::nil(), now), Err(Error::Validation(_))));

    let mut adj = AdjustStock::new(-2, "breakage", "nurse-1");
    adj.actor = Some(String::new());
    assert!(matches!(adj.into_entry(Uuid::nil(), now), Err(Error::Validation(_))));
  }

  #[test]
  fn adjustment_rejects_foreign_causes() {
    let now = Utc::now();
    for cause in [MovementCause::Dispense, MovementCause::Receipt] {
      let mut adj = AdjustStock::new(-1, "x", "nurse-1");
      adj.cause = Some(cause);
      assert!(adj.into_entry(Uuid::nil(), now).is_err());
    }

    let mut ret = AdjustStock::new(-1, "patient returned", "nurse-1");
    ret.cause = Some(MovementCause::Return);
    assert!(ret.into_entry(Uuid::nil(), now).is_err());

    let mut ret = AdjustStock::new(3, "patient returned", "nurse-1");
    ret.cause = Some(MovementCause::Return);
    let entry = ret.into_entry(Uuid::nil(), now).unwrap();
    assert_eq!(entry.cause, MovementCause::Return);
    assert_eq!(entry.note.as_deref(), Some("patient returned"));
  }

  #[test]
  fn zero_adjustment_is_rejected() {
    let adj = AdjustStock::new(0, "noop", "nurse-1");
    assert!(matches!(adj.into_entry(Uuid::nil(), Utc::now()), Err(Error::Validation(_))));
  }

  #[test]
  fn missing_delta_is_a_validation_error() {
    let mut adj = AdjustStock::new(1, "recount", "nurse-1");
    adj.delta = None;
    assert!(matches!(
      adj.into_entry(Uuid::nil(), Utc::now()),
      Err(Error::Validation(m)) if m.contains("delta")
    ));
  }

  proptest! {
    #![proptest_config(ProptestConfig {
      cases: 256,
      ..ProptestConfig::default()
    })]

    /// Property: whatever sequence of movements is attempted, only the ones
    /// that keep the batch within bounds are accepted, and the accepted ones
    /// always replay to the cached on-hand quantity.
    #[test]
    fn accepted_movements_replay_to_on_hand(
      received in 1i64..500,
      deltas in prop::collection::vec(-200i64..200, 0..40),
    ) {
      let mut b = batch(received);
      let mut accepted = vec![received];

      for delta in deltas {
        match apply_delta(&b, delta) {
          Ok(next) => {
            b.qty_on_hand_units = next;
            accepted.push(delta);
          }
          Err(Error::Consistency { .. }) => {}
          Err(other) => panic!("unexpected error: {other}"),
        }
        prop_assert!(b.qty_on_hand_units >= 0);
        prop_assert!(b.qty_on_hand_units <= b.qty_received_units);
        prop_assert_eq!(accepted.iter().sum::<i64>(), b.qty_on_hand_units);
      }
    }
  }
}
