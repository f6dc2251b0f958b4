//! `stockroom-core`: shared building blocks for the inventory ledger.
//!
//! This crate contains **pure** primitives (no storage, no IO): the error
//! taxonomy every layer reports through and the strongly-typed identifiers.

pub mod error;
pub mod id;

pub use error::{LedgerError, LedgerResult};
pub use id::{BillId, EntryId, ItemCode};
