//! Core types and trait definitions for the Dispensary inventory engine.
//!
//! This crate holds the batch and ledger model, the FIFO planner and the
//! alert pass. It performs no I/O; storage backends implement
//! [`store::InventoryStore`].

pub mod alerts;
pub mod allocation;
pub mod batch;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod store;

pub use error::{Error, Result};
