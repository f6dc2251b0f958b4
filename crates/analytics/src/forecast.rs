//! Usage forecasting: monthly consumption and a depletion estimate.
//!
//! Model:
//! - Every calendar month with at least one ledger row for the item is one
//!   observation; its usage is the `issued` sum (0 for a receive-only month).
//! - Months without any ledger row are absent, not zero.
//! - The average is rounded to the nearest whole unit (halves round up).

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use stockroom_core::ItemCode;
use stockroom_inventory::{LedgerEntry, TransactionKind};

use crate::month::MonthKey;

/// Consumption of one item in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyUsage {
    pub month: MonthKey,
    /// Σ issued quantity in the month.
    pub issued: i64,
    /// Number of ledger rows (any kind) in the month.
    pub transactions: i64,
}

/// Whole months of stock left at the average rate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MonthsLeft {
    Finite(i64),
    /// Stock on hand but no recorded consumption; no estimate possible.
    Unbounded,
}

impl Serialize for MonthsLeft {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MonthsLeft::Finite(n) => serializer.serialize_i64(*n),
            MonthsLeft::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepletionEstimate {
    pub item_code: ItemCode,
    pub average_monthly_usage: i64,
    pub current_stock: i64,
    pub estimated_months_left: MonthsLeft,
    pub months_observed: usize,
}

/// Group an item's ledger rows by calendar month, oldest first.
pub fn monthly_usage<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Vec<MonthlyUsage> {
    let mut by_month: BTreeMap<MonthKey, MonthlyUsage> = BTreeMap::new();
    for entry in entries {
        let month = MonthKey::of(entry.occurred_at);
        let bucket = by_month.entry(month).or_insert(MonthlyUsage {
            month,
            issued: 0,
            transactions: 0,
        });
        bucket.transactions += 1;
        if entry.kind == TransactionKind::Issued {
            bucket.issued += entry.quantity;
        }
    }
    by_month.into_values().collect()
}

/// Mean issued-per-month over the observed months, rounded half up.
///
/// Returns 0 when no month was observed.
pub fn average_monthly_usage(months: &[MonthlyUsage]) -> i64 {
    if months.is_empty() {
        return 0;
    }
    let n = months.len() as i128;
    let total: i128 = months.iter().map(|m| m.issued as i128).sum();
    // floor((2 * total + n) / (2 * n)) == round-half-up(total / n) for total >= 0.
    ((2 * total + n).div_euclid(2 * n)) as i64
}

pub fn estimate_depletion(
    item_code: ItemCode,
    current_stock: i64,
    months: &[MonthlyUsage],
) -> DepletionEstimate {
    let average = average_monthly_usage(months);

    let estimated_months_left = if average > 0 {
        MonthsLeft::Finite(current_stock.max(0) / average)
    } else if current_stock > 0 {
        MonthsLeft::Unbounded
    } else {
        MonthsLeft::Finite(0)
    };

    DepletionEstimate {
        item_code,
        average_monthly_usage: average,
        current_stock,
        estimated_months_left,
        months_observed: months.len(),
    }
}
