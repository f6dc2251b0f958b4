//! Postgres pool lifecycle and schema bootstrap.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{info, instrument};

use stockroom_core::{LedgerError, LedgerResult};

use crate::config::DatabaseConfig;
use crate::error::map_sqlx_error;

const SCHEMA: &[(&str, &str)] = &[
    (
        "inventory",
        r#"
        CREATE TABLE IF NOT EXISTS inventory (
            code        TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            category    TEXT NOT NULL,
            unit_type   TEXT NOT NULL CHECK (unit_type IN ('single_unit', 'pack')),
            pack_size   INTEGER NOT NULL CHECK (pack_size > 0),
            weight      DOUBLE PRECISION NOT NULL CHECK (weight > 0),
            price       BIGINT NOT NULL CHECK (price >= 0),
            barcode     TEXT NOT NULL UNIQUE,
            quantity    BIGINT NOT NULL DEFAULT 0 CHECK (quantity >= 0),
            image       TEXT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "stock_transaction",
        r#"
        CREATE TABLE IF NOT EXISTS stock_transaction (
            id               BIGSERIAL PRIMARY KEY,
            item_code        TEXT NOT NULL REFERENCES inventory (code) ON DELETE RESTRICT,
            quantity         BIGINT NOT NULL CHECK (quantity > 0),
            transaction_type TEXT NOT NULL CHECK (transaction_type IN ('issued', 'received')),
            price            BIGINT NOT NULL CHECK (price >= 0),
            transaction_date TIMESTAMPTZ NOT NULL,
            remaining_after  BIGINT NOT NULL CHECK (remaining_after >= 0),
            updated_by       TEXT NULL,
            bill_id          UUID NULL
        )
        "#,
    ),
    (
        "stock_transaction_item_date_idx",
        "CREATE INDEX IF NOT EXISTS stock_transaction_item_date_idx \
         ON stock_transaction (item_code, transaction_date)",
    ),
    (
        "stock_transaction_bill_idx",
        "CREATE INDEX IF NOT EXISTS stock_transaction_bill_idx \
         ON stock_transaction (bill_id) WHERE bill_id IS NOT NULL",
    ),
];

/// Explicit handle on the connection pool.
///
/// Created once by the calling layer and passed to the store; there is no
/// global pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool. Every connection runs with the configured
    /// `statement_timeout`, which is how long-running ledger calls are cancelled.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> LedgerResult<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| LedgerError::invalid(format!("invalid DATABASE_URL: {e}")))?
            .options([(
                "statement_timeout",
                config.statement_timeout.as_millis().to_string(),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.statement_timeout)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        info!("database pool ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the ledger tables if they do not exist yet. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn init_schema(&self) -> LedgerResult<()> {
        for &(name, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(&format!("create {name}"), e))?;
        }
        info!(objects = SCHEMA.len(), "schema ensured");
        Ok(())
    }

    /// Close every connection; pending acquires fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}
