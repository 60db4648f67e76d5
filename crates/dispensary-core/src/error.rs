//! Error types for `dispensary-core`.

use thiserror::Error;
use uuid::Uuid;

/// The engine's error taxonomy. All variants are terminal for the request
/// that triggered them; nothing here is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// Malformed or missing input.
  #[error("validation error: {0}")]
  Validation(String),

  /// Applying the change would break `0 <= on_hand <= received`.
  #[error(
    "consistency error: batch {batch_id} has {on_hand}/{received} units on \
     hand; delta {delta} is not applicable"
  )]
  Consistency {
    batch_id: Uuid,
    on_hand:  i64,
    received: i64,
    delta:    i64,
  },

  /// Not enough eligible stock to satisfy a dispense. An expected business
  /// outcome rather than a fault.
  #[error("insufficient stock: requested {requested}, available {available}")]
  InsufficientStock { requested: i64, available: i64 },

  #[error("batch not found: {0}")]
  BatchNotFound(Uuid),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

  /// Short machine-readable name, used by transports.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation",
      Self::Consistency { .. } => "consistency",
      Self::InsufficientStock { .. } => "insufficient_stock",
      Self::BatchNotFound(_) => "not_found",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reject an absent or blank identifier.
pub fn require(field: &str, value: Option<&str>) -> Result<String> {
  match value.map(str::trim) {
    Some(v) if !v.is_empty() => Ok(v.to_owned()),
    _ => Err(Error::validation(format!("{field} is required"))),
  }
}
