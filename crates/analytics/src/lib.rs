//! `stockroom-analytics`
//!
//! **Responsibility:** read-side analytics over ledger history.
//!
//! This crate never mutates stock or ledger state. Storage adapters hand it
//! already-grouped monthly figures (or raw entries, for the in-memory store)
//! and it turns them into depletion estimates and trend series.

pub mod forecast;
pub mod month;
pub mod trend;

pub use forecast::{
    DepletionEstimate, MonthlyUsage, MonthsLeft, average_monthly_usage, estimate_depletion,
    monthly_usage,
};
pub use month::MonthKey;
pub use trend::{MonthlyIssued, TrendPoint, monthly_issued, pivot, trend_window_start};
