use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{BillId, EntryId, ItemCode, LedgerError, LedgerResult};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Stock leaving (decreases on-hand quantity).
    Issued,
    /// Stock arriving (increases on-hand quantity).
    Received,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Issued => "issued",
            TransactionKind::Received => "received",
        }
    }

    /// Signed quantity change applied to the stock store.
    pub fn delta(&self, quantity: i64) -> i64 {
        match self {
            TransactionKind::Issued => -quantity,
            TransactionKind::Received => quantity,
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "issued" => Ok(TransactionKind::Issued),
            "received" => Ok(TransactionKind::Received),
            other => Err(LedgerError::invalid(format!(
                "transaction type must be one of: issued, received (got '{other}')"
            ))),
        }
    }
}

/// One issue/receive request against an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub item_code: ItemCode,
    pub quantity: i64,
    pub kind: TransactionKind,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: i64,
    /// Optional actor label recorded as `updated_by`.
    #[serde(default)]
    pub actor: Option<String>,
}

impl TransactionRequest {
    pub fn new(item_code: ItemCode, quantity: i64, kind: TransactionKind, unit_price: i64) -> Self {
        Self {
            item_code,
            quantity,
            kind,
            unit_price,
            actor: None,
        }
    }

    pub fn issued(item_code: ItemCode, quantity: i64, unit_price: i64) -> Self {
        Self::new(item_code, quantity, TransactionKind::Issued, unit_price)
    }

    pub fn received(item_code: ItemCode, quantity: i64, unit_price: i64) -> Self {
        Self::new(item_code, quantity, TransactionKind::Received, unit_price)
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.quantity <= 0 {
            return Err(LedgerError::invalid("quantity must be positive"));
        }
        if self.unit_price < 0 {
            return Err(LedgerError::invalid("unit price cannot be negative"));
        }
        if self.actor.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(LedgerError::invalid("actor label cannot be blank"));
        }
        Ok(())
    }

    /// Signed quantity change for the stock store.
    pub fn delta(&self) -> i64 {
        self.kind.delta(self.quantity)
    }

    /// `quantity * unit_price`, rejecting overflow.
    pub fn amount(&self) -> LedgerResult<i64> {
        self.quantity
            .checked_mul(self.unit_price)
            .ok_or_else(|| LedgerError::invalid("line amount overflows"))
    }

    /// Build the row to append once the stock store reported `remaining_after`.
    pub fn to_entry(
        &self,
        remaining_after: i64,
        occurred_at: DateTime<Utc>,
        bill_id: Option<BillId>,
    ) -> NewLedgerEntry {
        NewLedgerEntry {
            item_code: self.item_code.clone(),
            quantity: self.quantity,
            kind: self.kind,
            unit_price: self.unit_price,
            occurred_at,
            remaining_after,
            updated_by: self.actor.clone(),
            bill_id,
        }
    }
}

/// A ledger row that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub item_code: ItemCode,
    pub quantity: i64,
    pub kind: TransactionKind,
    pub unit_price: i64,
    pub occurred_at: DateTime<Utc>,
    pub remaining_after: i64,
    pub updated_by: Option<String>,
    pub bill_id: Option<BillId>,
}

impl NewLedgerEntry {
    pub fn with_id(self, id: EntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            item_code: self.item_code,
            quantity: self.quantity,
            kind: self.kind,
            unit_price: self.unit_price,
            occurred_at: self.occurred_at,
            remaining_after: self.remaining_after,
            updated_by: self.updated_by,
            bill_id: self.bill_id,
        }
    }
}

/// Immutable, append-only ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub item_code: ItemCode,
    pub quantity: i64,
    pub kind: TransactionKind,
    pub unit_price: i64,
    pub occurred_at: DateTime<Utc>,
    /// On-hand quantity right after this entry was applied.
    pub remaining_after: i64,
    pub updated_by: Option<String>,
    pub bill_id: Option<BillId>,
}

/// Quantity after applying `delta` to `current`.
///
/// Fails with `InsufficientStock` when the result would be negative.
pub fn next_quantity(item_code: &ItemCode, current: i64, delta: i64) -> LedgerResult<i64> {
    let next = current
        .checked_add(delta)
        .ok_or_else(|| LedgerError::invalid("quantity overflows"))?;
    if next < 0 {
        return Err(LedgerError::InsufficientStock {
            item_code: item_code.clone(),
            requested: -delta,
            available: current,
        });
    }
    Ok(next)
}

/// Σ received − Σ issued over `entries`.
///
/// For a complete item history this equals the item's on-hand quantity.
pub fn ledger_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> i64 {
    entries
        .into_iter()
        .map(|e| e.kind.delta(e.quantity))
        .sum()
}
