//! Postgres-backed stock store.
//!
//! ## Concurrency
//!
//! `adjust_quantity` is a single conditional `UPDATE ... RETURNING`. The row
//! lock it takes is held until the surrounding transaction ends, so two
//! concurrent issues against the same item are serialized by Postgres and the
//! `quantity + delta >= 0` guard is evaluated against the committed value.
//! No in-process locking is involved.
//!
//! ## Error Mapping
//!
//! See [`crate::error`]. In short: lost races and still-referenced rows are
//! `Conflict`, `statement_timeout` is `Timeout`, everything unexpected is
//! `Internal`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, debug, instrument};

use stockroom_analytics::{MonthKey, MonthlyIssued, MonthlyUsage};
use stockroom_core::{BillId, EntryId, ItemCode, LedgerError, LedgerResult};
use stockroom_inventory::{
    InventoryItem, ItemDetails, LedgerEntry, NewItem, NewLedgerEntry, TransactionKind, UnitType,
};

use super::{HistoryQuery, StockStore, StockTransaction};
use crate::error::map_sqlx_error;

const ITEM_COLUMNS: &str = "code, description, category, unit_type, pack_size, weight, price, \
                            barcode, quantity, image, created_at";

const ENTRY_COLUMNS: &str = "id, item_code, quantity, transaction_type, price, transaction_date, \
                             remaining_after, updated_by, bill_id";

/// Postgres-backed stock store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> LedgerResult<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(skip(self, code), fields(item_code = %code), err)]
    async fn quantity(&self, code: &ItemCode) -> LedgerResult<i64> {
        let row = sqlx::query("SELECT quantity FROM inventory WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_quantity", e))?;

        match row {
            Some(row) => row
                .try_get("quantity")
                .map_err(|e| map_sqlx_error("get_quantity", e)),
            None => Err(LedgerError::not_found(code)),
        }
    }

    async fn find_item(&self, code: &ItemCode) -> LedgerResult<Option<InventoryItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;
        row.map(|r| decode_item(&r)).transpose()
    }

    async fn find_by_barcode(&self, barcode: &str) -> LedgerResult<Option<InventoryItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory WHERE barcode = $1");
        let row = sqlx::query(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_barcode", e))?;
        row.map(|r| decode_item(&r)).transpose()
    }

    async fn list_items(&self) -> LedgerResult<Vec<InventoryItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory ORDER BY code ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(decode_item).collect()
    }

    async fn low_stock(&self, threshold: i64) -> LedgerResult<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory WHERE quantity < $1 \
             ORDER BY quantity ASC, code ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("low_stock", e))?;
        rows.iter().map(decode_item).collect()
    }

    #[instrument(skip(self, code), fields(item_code = %code, months = tracing::field::Empty), err)]
    async fn monthly_usage(&self, code: &ItemCode) -> LedgerResult<Vec<MonthlyUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT
                EXTRACT(YEAR FROM transaction_date AT TIME ZONE 'UTC')::INT AS year,
                EXTRACT(MONTH FROM transaction_date AT TIME ZONE 'UTC')::INT AS month,
                COALESCE(SUM(quantity) FILTER (WHERE transaction_type = 'issued'), 0)::BIGINT AS issued,
                COUNT(*) AS transactions
            FROM stock_transaction
            WHERE item_code = $1
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(code.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("monthly_usage", e))?;

        let usage = rows
            .iter()
            .map(|row| {
                Ok(MonthlyUsage {
                    month: decode_month(row)?,
                    issued: get(row, "issued")?,
                    transactions: get(row, "transactions")?,
                })
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        Span::current().record("months", usage.len());
        Ok(usage)
    }

    async fn monthly_issued(
        &self,
        codes: &BTreeSet<ItemCode>,
        since: NaiveDate,
    ) -> LedgerResult<Vec<MonthlyIssued>> {
        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_string()).collect();
        let since: DateTime<Utc> = since.and_time(NaiveTime::MIN).and_utc();

        let rows = sqlx::query(
            r#"
            SELECT
                item_code,
                EXTRACT(YEAR FROM transaction_date AT TIME ZONE 'UTC')::INT AS year,
                EXTRACT(MONTH FROM transaction_date AT TIME ZONE 'UTC')::INT AS month,
                COALESCE(SUM(quantity) FILTER (WHERE transaction_type = 'issued'), 0)::BIGINT AS issued
            FROM stock_transaction
            WHERE item_code = ANY($1) AND transaction_date >= $2
            GROUP BY item_code, 2, 3
            ORDER BY 2, 3, item_code
            "#,
        )
        .bind(codes)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("monthly_issued", e))?;

        rows.iter()
            .map(|row| {
                Ok(MonthlyIssued {
                    item_code: decode_code(row, "item_code")?,
                    month: decode_month(row)?,
                    issued: get(row, "issued")?,
                })
            })
            .collect()
    }

    async fn history(&self, query: &HistoryQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM stock_transaction \
             WHERE ($1::TEXT IS NULL OR item_code = $1) \
               AND ($2::UUID IS NULL OR bill_id = $2) \
             ORDER BY id DESC \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(query.item_code.as_ref().map(|c| c.as_str()))
            .bind(query.bill_id.map(|b| *b.as_uuid()))
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter()
            .map(|row| {
                LedgerEntryRow::from_row(row)
                    .map_err(|e| map_sqlx_error("history", e))?
                    .try_into()
            })
            .collect()
    }
}

/// One open Postgres transaction. Rolled back by sqlx when dropped uncommitted.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    #[instrument(skip(self, code), fields(item_code = %code), err)]
    async fn adjust_quantity(&mut self, code: &ItemCode, delta: i64) -> LedgerResult<i64> {
        let updated = sqlx::query(
            r#"
            UPDATE inventory
            SET quantity = quantity + $2
            WHERE code = $1 AND quantity + $2 >= 0
            RETURNING quantity
            "#,
        )
        .bind(code.as_str())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_quantity", e))?;

        if let Some(row) = updated {
            return get(&row, "quantity");
        }

        // The guard rejected the update, or the item does not exist.
        let current = sqlx::query("SELECT quantity FROM inventory WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("adjust_quantity", e))?;

        match current {
            Some(row) => {
                let available: i64 = get(&row, "quantity")?;
                debug!(available, "adjustment rejected by non-negative guard");
                Err(LedgerError::InsufficientStock {
                    item_code: code.clone(),
                    requested: -delta,
                    available,
                })
            }
            None => Err(LedgerError::not_found(code)),
        }
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> LedgerResult<LedgerEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_transaction (
                item_code,
                quantity,
                transaction_type,
                price,
                transaction_date,
                remaining_after,
                updated_by,
                bill_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, transaction_date
            "#,
        )
        .bind(entry.item_code.as_str())
        .bind(entry.quantity)
        .bind(entry.kind.as_str())
        .bind(entry.unit_price)
        .bind(entry.occurred_at)
        .bind(entry.remaining_after)
        .bind(entry.updated_by.as_deref())
        .bind(entry.bill_id.map(|b| *b.as_uuid()))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;

        // Echo the stored timestamp; TIMESTAMPTZ keeps microseconds only.
        let id: i64 = get(&row, "id")?;
        let occurred_at: DateTime<Utc> = get(&row, "transaction_date")?;
        Ok(NewLedgerEntry { occurred_at, ..entry }.with_id(EntryId::new(id)))
    }

    async fn insert_item(
        &mut self,
        item: &NewItem,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<InventoryItem> {
        let details = &item.details;
        let sql = format!(
            "INSERT INTO inventory (code, description, category, unit_type, pack_size, weight, \
                                    price, barcode, quantity, image, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, NULL, $9) \
             RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(item.code.as_str())
            .bind(&details.description)
            .bind(&details.category)
            .bind(details.unit_type.as_str())
            .bind(details.effective_pack_size())
            .bind(details.weight)
            .bind(details.price)
            .bind(&details.barcode)
            .bind(created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_item", e))?;
        decode_item(&row)
    }

    async fn update_details(
        &mut self,
        code: &ItemCode,
        details: &ItemDetails,
    ) -> LedgerResult<InventoryItem> {
        let sql = format!(
            "UPDATE inventory \
             SET description = $2, category = $3, unit_type = $4, pack_size = $5, \
                 weight = $6, price = $7, barcode = $8 \
             WHERE code = $1 \
             RETURNING {ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(code.as_str())
            .bind(&details.description)
            .bind(&details.category)
            .bind(details.unit_type.as_str())
            .bind(details.effective_pack_size())
            .bind(details.weight)
            .bind(details.price)
            .bind(&details.barcode)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_details", e))?;

        match row {
            Some(row) => decode_item(&row),
            None => Err(LedgerError::not_found(code)),
        }
    }

    async fn attach_image(&mut self, code: &ItemCode, image: &str) -> LedgerResult<InventoryItem> {
        let sql = format!("UPDATE inventory SET image = $2 WHERE code = $1 RETURNING {ITEM_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(code.as_str())
            .bind(image)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("attach_image", e))?;

        match row {
            Some(row) => decode_item(&row),
            None => Err(LedgerError::not_found(code)),
        }
    }

    async fn remove_item(&mut self, code: &ItemCode) -> LedgerResult<()> {
        let result = sqlx::query("DELETE FROM inventory WHERE code = $1")
            .bind(code.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match map_sqlx_error("remove_item", e) {
                LedgerError::Conflict(_) => {
                    LedgerError::conflict(format!("item {code} is referenced by ledger entries"))
                }
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(code));
        }
        Ok(())
    }

    async fn commit(self) -> LedgerResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

// SQLx row types

fn get<'r, T>(row: &'r PgRow, column: &str) -> LedgerResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| LedgerError::internal(format!("failed to decode column {column}: {e}")))
}

fn decode_code(row: &PgRow, column: &str) -> LedgerResult<ItemCode> {
    let raw: String = get(row, column)?;
    raw.parse()
        .map_err(|_| LedgerError::internal(format!("stored item code '{raw}' is invalid")))
}

fn decode_month(row: &PgRow) -> LedgerResult<MonthKey> {
    let year: i32 = get(row, "year")?;
    let month: i32 = get(row, "month")?;
    u32::try_from(month)
        .ok()
        .and_then(|m| MonthKey::new(year, m))
        .ok_or_else(|| LedgerError::internal(format!("invalid month {year}-{month}")))
}

fn decode_item(row: &PgRow) -> LedgerResult<InventoryItem> {
    let unit_type: String = get(row, "unit_type")?;
    let unit_type: UnitType = unit_type
        .parse()
        .map_err(|_| LedgerError::internal(format!("stored unit type '{unit_type}' is invalid")))?;

    Ok(InventoryItem {
        code: decode_code(row, "code")?,
        description: get(row, "description")?,
        category: get(row, "category")?,
        unit_type,
        pack_size: get(row, "pack_size")?,
        weight: get(row, "weight")?,
        price: get(row, "price")?,
        barcode: get(row, "barcode")?,
        quantity: get(row, "quantity")?,
        image: get(row, "image")?,
        created_at: get(row, "created_at")?,
    })
}

#[derive(Debug)]
struct LedgerEntryRow {
    id: i64,
    item_code: String,
    quantity: i64,
    transaction_type: String,
    price: i64,
    transaction_date: DateTime<Utc>,
    remaining_after: i64,
    updated_by: Option<String>,
    bill_id: Option<uuid::Uuid>,
}

impl<'r> FromRow<'r, PgRow> for LedgerEntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerEntryRow {
            id: row.try_get("id")?,
            item_code: row.try_get("item_code")?,
            quantity: row.try_get("quantity")?,
            transaction_type: row.try_get("transaction_type")?,
            price: row.try_get("price")?,
            transaction_date: row.try_get("transaction_date")?,
            remaining_after: row.try_get("remaining_after")?,
            updated_by: row.try_get("updated_by")?,
            bill_id: row.try_get("bill_id")?,
        })
    }
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        let kind: TransactionKind = row.transaction_type.parse().map_err(|_| {
            LedgerError::internal(format!(
                "stored transaction type '{}' is invalid",
                row.transaction_type
            ))
        })?;
        let item_code: ItemCode = row.item_code.parse().map_err(|_| {
            LedgerError::internal(format!("stored item code '{}' is invalid", row.item_code))
        })?;

        Ok(LedgerEntry {
            id: EntryId::new(row.id),
            item_code,
            quantity: row.quantity,
            kind,
            unit_price: row.price,
            occurred_at: row.transaction_date,
            remaining_after: row.remaining_after,
            updated_by: row.updated_by,
            bill_id: row.bill_id.map(BillId::from_uuid),
        })
    }
}
