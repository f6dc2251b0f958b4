//! The ledger service: every stock-affecting operation goes through here.
//!
//! Each write runs in exactly one store transaction. On any failure the
//! transaction is rolled back before the error is returned, so a failed call
//! leaves no trace. Nothing in this module retries.

use std::collections::BTreeSet;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{Span, info, instrument, warn};

use stockroom_analytics::{
    DepletionEstimate, TrendPoint, estimate_depletion, pivot, trend_window_start,
};
use stockroom_core::{BillId, ItemCode, LedgerError, LedgerResult};
use stockroom_inventory::{
    Cart, InventoryItem, ItemDetails, LedgerEntry, NewItem, Receipt, ScanLine, TransactionRequest,
};

use crate::config::LedgerConfig;
use crate::store::{HistoryQuery, StockStore, StockTransaction};

/// Inventory ledger over a [`StockStore`].
#[derive(Debug, Clone)]
pub struct StockLedger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S: StockStore> StockLedger<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- Stock store reads ----

    pub async fn get_quantity(&self, code: &ItemCode) -> LedgerResult<i64> {
        self.store.quantity(code).await
    }

    pub async fn find_item(&self, code: &ItemCode) -> LedgerResult<InventoryItem> {
        self.store
            .find_item(code)
            .await?
            .ok_or_else(|| LedgerError::not_found(code))
    }

    /// Resolve a scanned barcode; `None` when nothing carries it.
    pub async fn find_by_barcode(&self, barcode: &str) -> LedgerResult<Option<InventoryItem>> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(LedgerError::invalid("barcode cannot be empty"));
        }
        self.store.find_by_barcode(barcode).await
    }

    pub async fn list_items(&self) -> LedgerResult<Vec<InventoryItem>> {
        self.store.list_items().await
    }

    /// Items below the configured low-stock threshold, lowest first.
    pub async fn low_stock(&self) -> LedgerResult<Vec<InventoryItem>> {
        self.store.low_stock(self.config.low_stock_threshold).await
    }

    // ---- Catalogue ----

    /// Product-add. A positive opening quantity is booked as a `received`
    /// ledger row in the same transaction.
    #[instrument(skip(self, item), fields(item_code = %item.code, opening_quantity = item.opening_quantity), err)]
    pub async fn create_item(&self, item: NewItem, actor: Option<&str>) -> LedgerResult<InventoryItem> {
        let item = item.validated()?;
        let now = ledger_clock();

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut created = tx.insert_item(&item, now).await?;
            if item.opening_quantity > 0 {
                let mut opening = TransactionRequest::received(
                    item.code.clone(),
                    item.opening_quantity,
                    item.details.price,
                );
                opening.actor = actor.map(str::to_string);
                let entry = apply_line(&mut tx, &opening, now, None).await?;
                created.quantity = entry.remaining_after;
            }
            Ok::<_, LedgerError>(created)
        }
        .await;

        let created = finish(tx, result).await?;
        info!(quantity = created.quantity, "item created");
        Ok(created)
    }

    /// Direct edit of descriptive fields. Quantity is never touched here.
    #[instrument(skip(self, details), fields(item_code = %code), err)]
    pub async fn update_details(
        &self,
        code: &ItemCode,
        details: ItemDetails,
    ) -> LedgerResult<InventoryItem> {
        let details = details.validated()?;
        let mut tx = self.store.begin().await?;
        let result = tx.update_details(code, &details).await;
        finish(tx, result).await
    }

    /// Store the opaque image reference handed over by the upload collaborator.
    #[instrument(skip(self), fields(item_code = %code), err)]
    pub async fn attach_image(&self, code: &ItemCode, image: &str) -> LedgerResult<InventoryItem> {
        let image = image.trim();
        if image.is_empty() {
            return Err(LedgerError::invalid("image reference cannot be empty"));
        }
        let mut tx = self.store.begin().await?;
        let result = tx.attach_image(code, image).await;
        finish(tx, result).await
    }

    /// Delete an item that no ledger row references.
    #[instrument(skip(self), fields(item_code = %code), err)]
    pub async fn remove_item(&self, code: &ItemCode) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;
        let result = tx.remove_item(code).await;
        finish(tx, result).await
    }

    // ---- Ledger appender ----

    /// Validate, adjust stock and append exactly one ledger row, atomically.
    #[instrument(
        skip(self, request),
        fields(
            item_code = %request.item_code,
            kind = %request.kind,
            quantity = request.quantity,
            remaining_after = tracing::field::Empty
        ),
        err
    )]
    pub async fn record_transaction(&self, request: TransactionRequest) -> LedgerResult<LedgerEntry> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let result = apply_line(&mut tx, &request, ledger_clock(), None).await;
        let entry = finish(tx, result).await?;

        Span::current().record("remaining_after", entry.remaining_after);
        Ok(entry)
    }

    // ---- Batch processor ----

    /// Apply `lines` in order as one all-or-nothing unit.
    ///
    /// The first failing line aborts the batch; the error is wrapped in
    /// `LedgerError::CartLine` naming its position and item code.
    #[instrument(
        skip(self, lines),
        fields(lines = lines.len(), bill_id = tracing::field::Empty, total_amount = tracing::field::Empty),
        err
    )]
    pub async fn apply_batch(&self, lines: Vec<TransactionRequest>) -> LedgerResult<Receipt> {
        let cart = Cart::new(lines)?;
        let bill_id = BillId::new();
        let now = ledger_clock();

        let mut tx = self.store.begin().await?;
        let mut entries = Vec::with_capacity(cart.lines().len());
        let mut result = Ok(());
        for (idx, line) in cart.lines().iter().enumerate() {
            match apply_line(&mut tx, line, now, Some(bill_id)).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    result = Err(e.at_cart_line(idx, &line.item_code));
                    break;
                }
            }
        }
        finish(tx, result).await?;

        let span = Span::current();
        span.record("bill_id", tracing::field::display(bill_id));
        span.record("total_amount", cart.total_amount());
        info!(entries = entries.len(), "batch committed");

        Ok(Receipt {
            bill_id,
            total_amount: cart.total_amount(),
            entries,
        })
    }

    /// Point-of-sale checkout: resolve each barcode, price the line at the
    /// item's current price and apply the cart as one batch.
    #[instrument(skip(self, scans), fields(lines = scans.len()), err)]
    pub async fn scan_checkout(
        &self,
        scans: Vec<ScanLine>,
        actor: Option<&str>,
    ) -> LedgerResult<Receipt> {
        if scans.is_empty() {
            return Err(LedgerError::invalid("cart cannot be empty"));
        }

        let mut lines = Vec::with_capacity(scans.len());
        for (idx, scan) in scans.iter().enumerate() {
            let item = self
                .store
                .find_by_barcode(scan.barcode.trim())
                .await?
                .ok_or_else(|| {
                    LedgerError::invalid(format!(
                        "cart line {idx}: unknown barcode '{}'",
                        scan.barcode
                    ))
                })?;
            lines.push(TransactionRequest::issued(item.code, scan.quantity, item.price));
        }

        let cart = Cart::new(lines)?.with_actor(actor);
        self.apply_batch(cart.lines().to_vec()).await
    }

    // ---- Usage forecaster ----

    /// Average monthly usage and whole months of stock left. Pure read.
    #[instrument(skip(self), fields(item_code = %code), err)]
    pub async fn estimate_depletion(&self, code: &ItemCode) -> LedgerResult<DepletionEstimate> {
        let current_stock = self.store.quantity(code).await?;
        let months = self.store.monthly_usage(code).await?;
        Ok(estimate_depletion(code.clone(), current_stock, &months))
    }

    /// Monthly issued totals of `codes` from two months before `now`, one row
    /// per month.
    pub async fn sales_trend(
        &self,
        codes: &[ItemCode],
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<TrendPoint>> {
        if codes.is_empty() {
            return Err(LedgerError::invalid("at least one item code is required"));
        }
        let codes: BTreeSet<ItemCode> = codes.iter().cloned().collect();
        let rows = self
            .store
            .monthly_issued(&codes, trend_window_start(now))
            .await?;
        Ok(pivot(rows))
    }

    /// Ledger rows newest first.
    pub async fn history(&self, query: &HistoryQuery) -> LedgerResult<Vec<LedgerEntry>> {
        if query.limit == 0 {
            return Err(LedgerError::invalid("history limit must be positive"));
        }
        self.store.history(query).await
    }
}

/// Timestamp for new rows, at the microsecond precision Postgres stores.
fn ledger_clock() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Adjust stock and append the matching row inside `tx`.
async fn apply_line<T: StockTransaction>(
    tx: &mut T,
    request: &TransactionRequest,
    occurred_at: DateTime<Utc>,
    bill_id: Option<BillId>,
) -> LedgerResult<LedgerEntry> {
    request.validate()?;
    let remaining_after = tx.adjust_quantity(&request.item_code, request.delta()).await?;
    tx.append_entry(request.to_entry(remaining_after, occurred_at, bill_id))
        .await
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged; the caller still sees the original error.
async fn finish<T: StockTransaction, R>(tx: T, result: LedgerResult<R>) -> LedgerResult<R> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
