//! The alert pass: expiring-soon, low-stock and FIFO-order warnings.
//!
//! [`evaluate`] is a pure function of a read snapshot. It is cheap enough to
//! run on every request and must be, since its output depends on the clock.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::{
  Error, Result,
  allocation::fifo_cmp,
  batch::{Batch, BatchFilter},
  ledger::{LedgerEntry, MovementCause},
  store::{InventoryStore, ItemCatalog},
};

pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 120;

/// Expiring within this many days (or already expired) is critical.
pub const CRITICAL_WITHIN_DAYS: i64 = 7;
/// Expiring within this many days is a warning.
pub const WARNING_WITHIN_DAYS: i64 = 30;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  Critical,
  Warning,
  Info,
}

impl Severity {
  pub fn for_days_until_expiry(days: i64) -> Self {
    if days <= CRITICAL_WITHIN_DAYS {
      Self::Critical
    } else if days <= WARNING_WITHIN_DAYS {
      Self::Warning
    } else {
      Self::Info
    }
  }
}

// ─── Alert records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringSoon {
  pub batch_id:          Uuid,
  pub batch_no:          String,
  pub item_id:           String,
  pub expiry_date:       NaiveDate,
  /// Negative once expired.
  pub days_until_expiry: i64,
  pub qty_on_hand_units: i64,
  pub severity:          Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStock {
  pub item_id:       String,
  pub total_stock:   i64,
  pub reorder_level: i64,
  pub severity:      Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoWarning {
  pub item_id:        String,
  pub older_batch_id: Uuid,
  pub older_batch_no: String,
  pub older_qty:      i64,
  pub newer_batch_id: Uuid,
  pub newer_batch_no: String,
  pub message:        String,
  pub severity:       Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
  pub total_alerts: usize,
  pub critical:     usize,
  pub warning:      usize,
  pub info:         usize,
}

impl AlertSummary {
  fn count(&mut self, severity: Severity) {
    self.total_alerts += 1;
    match severity {
      Severity::Critical => self.critical += 1,
      Severity::Warning => self.warning += 1,
      Severity::Info => self.info += 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReport {
  pub pharmacy_id:    String,
  pub generated_at:   DateTime<Utc>,
  pub lookahead_days: i64,
  pub summary:        AlertSummary,
  pub expiring_soon:  Vec<ExpiringSoon>,
  pub low_stock:      Vec<LowStock>,
  pub fifo_warnings:  Vec<FifoWarning>,
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// Everything the pass reads. Inactive batches and batches of other
/// pharmacies may be present; they are ignored.
#[derive(Debug, Clone)]
pub struct AlertInput<'a> {
  pub pharmacy_id:    &'a str,
  pub now:            DateTime<Utc>,
  pub lookahead_days: i64,
  pub batches:        &'a [Batch],
  /// Ledger entries of the pharmacy's active batches, from each batch's
  /// RECEIPT on. Replayed to recover stock at the time of every dispense.
  pub movements:      &'a [LedgerEntry],
  /// Per-item reorder levels; items without one are treated as level 0.
  pub reorder_levels: &'a HashMap<String, i64>,
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

pub fn evaluate(input: &AlertInput<'_>) -> Result<AlertReport> {
  if input.pharmacy_id.trim().is_empty() {
    return Err(Error::validation("pharmacy_id is required"));
  }
  if input.lookahead_days < 0 {
    return Err(Error::validation("days must not be negative"));
  }

  let active: Vec<Batch> = input
    .batches
    .iter()
    .filter(|b| b.active && b.pharmacy_id == input.pharmacy_id)
    .cloned()
    .collect();

  let expiring_soon = expiring_soon(&active, input.now.date_naive(), input.lookahead_days);
  let low_stock = low_stock(&active, input.reorder_levels);
  let fifo_warnings = fifo_warnings(&active, input.movements);

  let mut summary = AlertSummary::default();
  expiring_soon.iter().for_each(|a| summary.count(a.severity));
  low_stock.iter().for_each(|a| summary.count(a.severity));
  fifo_warnings.iter().for_each(|a| summary.count(a.severity));

  Ok(AlertReport {
    pharmacy_id: input.pharmacy_id.to_owned(),
    generated_at: input.now,
    lookahead_days: input.lookahead_days,
    summary,
    expiring_soon,
    low_stock,
    fifo_warnings,
  })
}

/// Gather a fresh snapshot from `store` and evaluate it. Nothing is cached:
/// every call reads live stock and the supplied `now`.
pub async fn report<S>(
  store: &S,
  pharmacy_id: &str,
  lookahead_days: i64,
  now: DateTime<Utc>,
) -> Result<AlertReport, <S as InventoryStore>::Error>
where
  S: InventoryStore + ItemCatalog<Error = <S as InventoryStore>::Error>,
{
  if pharmacy_id.trim().is_empty() {
    return Err(Error::validation("pharmacy_id is required").into());
  }

  let batches = store
    .list_batches(pharmacy_id.to_owned(), BatchFilter::default())
    .await?;
  let movements = store.fifo_movements(pharmacy_id.to_owned()).await?;
  let reorder_levels = store.reorder_levels(pharmacy_id.to_owned()).await?;

  Ok(evaluate(&AlertInput {
    pharmacy_id,
    now,
    lookahead_days,
    batches: &batches,
    movements: &movements,
    reorder_levels: &reorder_levels,
  })?)
}

fn expiring_soon(active: &[Batch], today: NaiveDate, lookahead: i64) -> Vec<ExpiringSoon> {
  let mut out: Vec<ExpiringSoon> = active
    .iter()
    .filter(|b| b.qty_on_hand_units > 0)
    .filter_map(|b| {
      let expiry = b.expiry_date?;
      let days = (expiry - today).num_days();
      (days <= lookahead).then(|| ExpiringSoon {
        batch_id:          b.batch_id,
        batch_no:          b.batch_no.clone(),
        item_id:           b.item_id.clone(),
        expiry_date:       expiry,
        days_until_expiry: days,
        qty_on_hand_units: b.qty_on_hand_units,
        severity:          Severity::for_days_until_expiry(days),
      })
    })
    .collect();
  out.sort_by(|a, b| {
    a.days_until_expiry
      .cmp(&b.days_until_expiry)
      .then_with(|| a.batch_no.cmp(&b.batch_no))
  });
  out
}

fn low_stock(active: &[Batch], reorder_levels: &HashMap<String, i64>) -> Vec<LowStock> {
  let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
  for b in active {
    let total = totals.entry(b.item_id.as_str()).or_default();
    *total = total.saturating_add(b.qty_on_hand_units);
  }
  for item in reorder_levels.keys() {
    totals.entry(item.as_str()).or_default();
  }

  totals
    .into_iter()
    .filter_map(|(item, total)| {
      let level = reorder_levels.get(item).copied().unwrap_or(0);
      (total <= level).then(|| LowStock {
        item_id:       item.to_owned(),
        total_stock:   total,
        reorder_level: level,
        severity:      if total == 0 { Severity::Critical } else { Severity::Warning },
      })
    })
    .collect()
}

/// Replays the ledger in `entry_id` order, tracking each active batch's
/// running on-hand from its RECEIPT onward. A DISPENSE from batch N is out of
/// order when a batch of the same item ahead of N in FIFO order held stock at
/// that entry. One warning per N, naming the first such batch at N's most
/// recent out-of-order dispense; `older_qty` is that batch's stock today.
fn fifo_warnings(active: &[Batch], movements: &[LedgerEntry]) -> Vec<FifoWarning> {
  let mut ordered: Vec<&Batch> = active.iter().collect();
  ordered.sort_by(|a, b| a.item_id.cmp(&b.item_id).then_with(|| fifo_cmp(a, b)));
  let position: HashMap<Uuid, usize> =
    ordered.iter().enumerate().map(|(idx, b)| (b.batch_id, idx)).collect();

  let mut entries: Vec<&LedgerEntry> = movements.iter().collect();
  entries.sort_by_key(|e| e.entry_id);

  let mut running = vec![0i64; ordered.len()];
  // newer position -> (older position, units the older batch held then)
  let mut violations: BTreeMap<usize, (usize, i64)> = BTreeMap::new();

  for entry in entries {
    let Some(&n) = position.get(&entry.batch_id) else {
      continue;
    };
    if entry.cause == MovementCause::Dispense {
      let item = &ordered[n].item_id;
      let older = (0..n).find(|&o| ordered[o].item_id == *item && running[o] > 0);
      if let Some(o) = older {
        violations.insert(n, (o, running[o]));
      }
    }
    running[n] = running[n].saturating_add(entry.delta);
  }

  violations
    .into_iter()
    .map(|(n, (o, held))| {
      let newer = ordered[n];
      let older = ordered[o];
      FifoWarning {
        item_id:        newer.item_id.clone(),
        older_batch_id: older.batch_id,
        older_batch_no: older.batch_no.clone(),
        older_qty:      older.qty_on_hand_units,
        newer_batch_id: newer.batch_id,
        newer_batch_no: newer.batch_no.clone(),
        message:        format!(
          "batch {} of {} was dispensed while older batch {} held {held} units \
           ({} on hand now)",
          newer.batch_no, newer.item_id, older.batch_no, older.qty_on_hand_units
        ),
        severity:       Severity::Warning,
      }
    })
    .collect()
}
