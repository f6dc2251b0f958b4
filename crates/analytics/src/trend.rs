//! Sales trend: monthly issued totals for a selection of items.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use stockroom_core::ItemCode;
use stockroom_inventory::{LedgerEntry, TransactionKind};

use crate::month::MonthKey;

/// Number of months before the current one included in a trend window.
pub const TREND_LOOKBACK_MONTHS: u32 = 2;

/// Issued total of one item in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyIssued {
    pub item_code: ItemCode,
    pub month: MonthKey,
    pub issued: i64,
}

/// One chart row: a month and the issued total per selected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub month: MonthKey,
    #[serde(flatten)]
    pub totals: BTreeMap<ItemCode, i64>,
}

/// First day of the month [`TREND_LOOKBACK_MONTHS`] months before `now`.
pub fn trend_window_start(now: DateTime<Utc>) -> NaiveDate {
    MonthKey::of(now)
        .months_back(TREND_LOOKBACK_MONTHS)
        .first_day()
}

/// Group `entries` of the selected items from `since` onwards by item and month.
pub fn monthly_issued<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    codes: &BTreeSet<ItemCode>,
    since: NaiveDate,
) -> Vec<MonthlyIssued> {
    let mut grouped: BTreeMap<(MonthKey, ItemCode), i64> = BTreeMap::new();
    for entry in entries {
        if !codes.contains(&entry.item_code) || entry.occurred_at.date_naive() < since {
            continue;
        }
        let total = grouped
            .entry((MonthKey::of(entry.occurred_at), entry.item_code.clone()))
            .or_insert(0);
        if entry.kind == TransactionKind::Issued {
            *total += entry.quantity;
        }
    }

    grouped
        .into_iter()
        .map(|((month, item_code), issued)| MonthlyIssued {
            item_code,
            month,
            issued,
        })
        .collect()
}

/// Pivot per-item rows into one row per month, oldest first.
///
/// Items without rows in a month are simply missing from that month's totals.
pub fn pivot(rows: impl IntoIterator<Item = MonthlyIssued>) -> Vec<TrendPoint> {
    let mut by_month: BTreeMap<MonthKey, BTreeMap<ItemCode, i64>> = BTreeMap::new();
    for row in rows {
        *by_month
            .entry(row.month)
            .or_default()
            .entry(row.item_code)
            .or_insert(0) += row.issued;
    }

    by_month
        .into_iter()
        .map(|(month, totals)| TrendPoint { month, totals })
        .collect()
}
