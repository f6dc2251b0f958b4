//! Environment-driven configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | required |
//! | `STOCKROOM_DB_MAX_CONNECTIONS` | `10` |
//! | `STOCKROOM_STATEMENT_TIMEOUT_MS` | `5000` |
//! | `STOCKROOM_LOW_STOCK_THRESHOLD` | `10` |

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the Postgres pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Applied as the session `statement_timeout` and as the pool acquire timeout.
    pub statement_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            statement_timeout: Duration::from_millis(DEFAULT_STATEMENT_TIMEOUT_MS),
        }
    }
}

/// Ledger behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Items with `quantity < low_stock_threshold` are reported as low stock.
    pub low_stock_threshold: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = parse_or(
            &lookup,
            "STOCKROOM_DB_MAX_CONNECTIONS",
            DEFAULT_MAX_CONNECTIONS,
        )?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "STOCKROOM_DB_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let timeout_ms = parse_or(
            &lookup,
            "STOCKROOM_STATEMENT_TIMEOUT_MS",
            DEFAULT_STATEMENT_TIMEOUT_MS,
        )?;

        let low_stock_threshold = parse_or(
            &lookup,
            "STOCKROOM_LOW_STOCK_THRESHOLD",
            DEFAULT_LOW_STOCK_THRESHOLD,
        )?;
        if low_stock_threshold < 0 {
            return Err(ConfigError::Invalid {
                name: "STOCKROOM_LOW_STOCK_THRESHOLD",
                value: low_stock_threshold.to_string(),
                reason: "cannot be negative".to_string(),
            });
        }

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections,
                statement_timeout: Duration::from_millis(timeout_ms),
            },
            ledger: LedgerConfig {
                low_stock_threshold,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
