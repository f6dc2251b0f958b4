//! Infrastructure layer: configuration, the Postgres pool, the storage seam
//! and the ledger service built on it.

pub mod config;
pub mod db;
mod error;
pub mod ledger;
pub mod store;

pub use config::{Config, ConfigError, DatabaseConfig, LedgerConfig};
pub use db::Database;
pub use ledger::StockLedger;
pub use store::{
    HistoryQuery, InMemoryStockStore, PostgresStockStore, StockStore, StockTransaction,
};

mod integration_tests;
