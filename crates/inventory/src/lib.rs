//! Inventory ledger domain module.
//!
//! This crate contains the business rules for items, ledger transactions and
//! checkout carts, implemented purely as deterministic domain logic (no IO, no
//! storage). Storage adapters in `stockroom-infra` call into it.

pub mod cart;
pub mod item;
pub mod transaction;

pub use cart::{Cart, Receipt, ScanLine};
pub use item::{InventoryItem, ItemDetails, NewItem, UnitType};
pub use transaction::{
    LedgerEntry, NewLedgerEntry, TransactionKind, TransactionRequest, ledger_balance,
    next_quantity,
};
