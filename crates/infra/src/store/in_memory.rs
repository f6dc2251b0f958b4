use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_analytics::{MonthlyIssued, MonthlyUsage, monthly_issued, monthly_usage};
use stockroom_core::{EntryId, ItemCode, LedgerError, LedgerResult};
use stockroom_inventory::{
    InventoryItem, ItemDetails, LedgerEntry, NewItem, NewLedgerEntry, next_quantity,
};

use super::{HistoryQuery, StockStore, StockTransaction};

#[derive(Debug, Clone, Default)]
struct State {
    items: BTreeMap<ItemCode, InventoryItem>,
    entries: Vec<LedgerEntry>,
    last_entry_id: i64,
}

impl State {
    fn item_mut(&mut self, code: &ItemCode) -> LedgerResult<&mut InventoryItem> {
        self.items
            .get_mut(code)
            .ok_or_else(|| LedgerError::not_found(code))
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. A transaction holds the store's single lock from
/// `begin` until commit or drop, so writers are fully serialized.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ledger row in append order (test helper).
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> LedgerResult<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            snapshot: Some(snapshot),
        })
    }

    async fn quantity(&self, code: &ItemCode) -> LedgerResult<i64> {
        let state = self.state.lock().await;
        state
            .items
            .get(code)
            .map(|item| item.quantity)
            .ok_or_else(|| LedgerError::not_found(code))
    }

    async fn find_item(&self, code: &ItemCode) -> LedgerResult<Option<InventoryItem>> {
        Ok(self.state.lock().await.items.get(code).cloned())
    }

    async fn find_by_barcode(&self, barcode: &str) -> LedgerResult<Option<InventoryItem>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .find(|item| item.barcode == barcode)
            .cloned())
    }

    async fn list_items(&self) -> LedgerResult<Vec<InventoryItem>> {
        Ok(self.state.lock().await.items.values().cloned().collect())
    }

    async fn low_stock(&self, threshold: i64) -> LedgerResult<Vec<InventoryItem>> {
        let state = self.state.lock().await;
        let mut low: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|item| item.quantity < threshold)
            .cloned()
            .collect();
        low.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| a.code.cmp(&b.code)));
        Ok(low)
    }

    async fn monthly_usage(&self, code: &ItemCode) -> LedgerResult<Vec<MonthlyUsage>> {
        let state = self.state.lock().await;
        Ok(monthly_usage(
            state.entries.iter().filter(|e| e.item_code == *code),
        ))
    }

    async fn monthly_issued(
        &self,
        codes: &BTreeSet<ItemCode>,
        since: NaiveDate,
    ) -> LedgerResult<Vec<MonthlyIssued>> {
        let state = self.state.lock().await;
        Ok(monthly_issued(&state.entries, codes, since))
    }

    async fn history(&self, query: &HistoryQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }
}

/// Exclusive transaction on an [`InMemoryStockStore`].
///
/// Restores the state captured at `begin` unless committed.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    snapshot: Option<State>,
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn adjust_quantity(&mut self, code: &ItemCode, delta: i64) -> LedgerResult<i64> {
        let item = self.guard.item_mut(code)?;
        let next = next_quantity(code, item.quantity, delta)?;
        item.quantity = next;
        Ok(next)
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> LedgerResult<LedgerEntry> {
        if !self.guard.items.contains_key(&entry.item_code) {
            return Err(LedgerError::conflict(format!(
                "ledger row references unknown item {}",
                entry.item_code
            )));
        }
        self.guard.last_entry_id += 1;
        let stored = entry.with_id(EntryId::new(self.guard.last_entry_id));
        self.guard.entries.push(stored.clone());
        Ok(stored)
    }

    async fn insert_item(
        &mut self,
        item: &NewItem,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<InventoryItem> {
        if self.guard.items.contains_key(&item.code) {
            return Err(LedgerError::conflict(format!(
                "item {} already exists",
                item.code
            )));
        }
        if self
            .guard
            .items
            .values()
            .any(|existing| existing.barcode == item.details.barcode)
        {
            return Err(LedgerError::conflict(format!(
                "barcode {} is already assigned",
                item.details.barcode
            )));
        }

        let details = &item.details;
        let stored = InventoryItem {
            code: item.code.clone(),
            description: details.description.clone(),
            category: details.category.clone(),
            unit_type: details.unit_type,
            pack_size: details.effective_pack_size(),
            weight: details.weight,
            price: details.price,
            barcode: details.barcode.clone(),
            quantity: 0,
            image: None,
            created_at,
        };
        self.guard.items.insert(stored.code.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_details(
        &mut self,
        code: &ItemCode,
        details: &ItemDetails,
    ) -> LedgerResult<InventoryItem> {
        if self
            .guard
            .items
            .values()
            .any(|other| other.code != *code && other.barcode == details.barcode)
        {
            return Err(LedgerError::conflict(format!(
                "barcode {} is already assigned",
                details.barcode
            )));
        }

        let item = self.guard.item_mut(code)?;
        item.description = details.description.clone();
        item.category = details.category.clone();
        item.unit_type = details.unit_type;
        item.pack_size = details.effective_pack_size();
        item.weight = details.weight;
        item.price = details.price;
        item.barcode = details.barcode.clone();
        Ok(item.clone())
    }

    async fn attach_image(&mut self, code: &ItemCode, image: &str) -> LedgerResult<InventoryItem> {
        let item = self.guard.item_mut(code)?;
        item.image = Some(image.to_string());
        Ok(item.clone())
    }

    async fn remove_item(&mut self, code: &ItemCode) -> LedgerResult<()> {
        if !self.guard.items.contains_key(code) {
            return Err(LedgerError::not_found(code));
        }
        if self.guard.entries.iter().any(|e| e.item_code == *code) {
            return Err(LedgerError::conflict(format!(
                "item {code} is referenced by ledger entries"
            )));
        }
        self.guard.items.remove(code);
        Ok(())
    }

    async fn commit(mut self) -> LedgerResult<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        // Drop restores the snapshot.
        Ok(())
    }
}
