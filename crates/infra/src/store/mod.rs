//! Storage seam of the ledger.
//!
//! A [`StockStore`] serves plain reads and opens [`StockTransaction`]s. Every
//! write goes through a transaction so that stock quantity and ledger rows
//! change together or not at all. Dropping a transaction without calling
//! [`StockTransaction::commit`] rolls it back.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_analytics::{MonthlyIssued, MonthlyUsage};
use stockroom_core::{BillId, ItemCode, LedgerResult};
use stockroom_inventory::{InventoryItem, ItemDetails, LedgerEntry, NewItem, NewLedgerEntry};

/// Read access plus transaction factory.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Tx: StockTransaction;

    /// Open a transaction. Writes become visible on commit only.
    async fn begin(&self) -> LedgerResult<Self::Tx>;

    /// Current on-hand quantity; `NotFound` for an unknown code.
    async fn quantity(&self, code: &ItemCode) -> LedgerResult<i64>;

    async fn find_item(&self, code: &ItemCode) -> LedgerResult<Option<InventoryItem>>;

    async fn find_by_barcode(&self, barcode: &str) -> LedgerResult<Option<InventoryItem>>;

    /// All items ordered by code.
    async fn list_items(&self) -> LedgerResult<Vec<InventoryItem>>;

    /// Items with `quantity < threshold`, lowest quantity first.
    async fn low_stock(&self, threshold: i64) -> LedgerResult<Vec<InventoryItem>>;

    /// Per-month usage of one item over its whole history, oldest month first.
    async fn monthly_usage(&self, code: &ItemCode) -> LedgerResult<Vec<MonthlyUsage>>;

    /// Per-item, per-month issued totals of `codes` from `since` onwards.
    async fn monthly_issued(
        &self,
        codes: &BTreeSet<ItemCode>,
        since: NaiveDate,
    ) -> LedgerResult<Vec<MonthlyIssued>>;

    /// Ledger rows matching `query`, newest first.
    async fn history(&self, query: &HistoryQuery) -> LedgerResult<Vec<LedgerEntry>>;
}

/// Writes scoped to one store transaction.
#[async_trait]
pub trait StockTransaction: Send {
    /// Atomically add `delta` to the item's quantity and return the new value.
    ///
    /// Fails with `InsufficientStock` (leaving the row untouched) when the
    /// result would be negative, and with `NotFound` for an unknown code.
    async fn adjust_quantity(&mut self, code: &ItemCode, delta: i64) -> LedgerResult<i64>;

    /// Append one immutable ledger row; the store assigns its id.
    async fn append_entry(&mut self, entry: NewLedgerEntry) -> LedgerResult<LedgerEntry>;

    /// Insert a catalogue item with quantity 0. `Conflict` on a duplicate
    /// code or barcode.
    async fn insert_item(
        &mut self,
        item: &NewItem,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<InventoryItem>;

    async fn update_details(
        &mut self,
        code: &ItemCode,
        details: &ItemDetails,
    ) -> LedgerResult<InventoryItem>;

    async fn attach_image(&mut self, code: &ItemCode, image: &str) -> LedgerResult<InventoryItem>;

    /// Delete an item. `Conflict` while ledger rows still reference it.
    async fn remove_item(&mut self, code: &ItemCode) -> LedgerResult<()>;

    async fn commit(self) -> LedgerResult<()>;

    async fn rollback(self) -> LedgerResult<()>;
}

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 1000;

/// Filter and page of a ledger history query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub item_code: Option<ItemCode>,
    pub bill_id: Option<BillId>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            item_code: None,
            bill_id: None,
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
        }
    }
}

impl HistoryQuery {
    pub fn for_item(code: ItemCode) -> Self {
        Self {
            item_code: Some(code),
            ..Self::default()
        }
    }

    pub fn for_bill(bill_id: BillId) -> Self {
        Self {
            bill_id: Some(bill_id),
            ..Self::default()
        }
    }

    /// Page size is capped at [`MAX_HISTORY_LIMIT`].
    pub fn page(mut self, limit: Option<u32>, offset: Option<u32>) -> Self {
        self.limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
        self.offset = offset.unwrap_or(0);
        self
    }

    pub(crate) fn matches(&self, entry: &LedgerEntry) -> bool {
        self.item_code.as_ref().is_none_or(|c| *c == entry.item_code)
            && self.bill_id.is_none_or(|b| entry.bill_id == Some(b))
    }
}
