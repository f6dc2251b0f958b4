//! Mapping of sqlx failures onto [`LedgerError`].
//!
//! | sqlx error | SQLSTATE | LedgerError |
//! |---|---|---|
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `InvalidInput` |
//! | Database (numeric value out of range) | `22003` | `InvalidInput` |
//! | Database (query canceled) | `57014` | `Timeout` |
//! | PoolTimedOut | n/a | `Timeout` |
//! | PoolClosed, Io, anything else | n/a | `Internal` |

use stockroom_core::LedgerError;

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            database_error(operation, db_err.code().as_deref(), db_err.message())
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::Timeout(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Internal(format!("connection pool closed in {}", operation))
        }
        _ => LedgerError::Internal(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Classify a database-reported failure by its SQLSTATE.
fn database_error(operation: &str, sqlstate: Option<&str>, message: &str) -> LedgerError {
    let msg = format!("database error in {}: {}", operation, message);
    match sqlstate {
        Some("40001") | Some("40P01") | Some("23505") | Some("23503") => LedgerError::Conflict(msg),
        Some("23514") | Some("22003") => LedgerError::InvalidInput(msg),
        Some("57014") => LedgerError::Timeout(msg),
        _ => LedgerError::Internal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_map_to_timeout_and_internal() {
        let err = map_sqlx_error("adjust_quantity", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(err.is_retryable());

        let err = map_sqlx_error("adjust_quantity", sqlx::Error::PoolClosed);
        assert!(matches!(err, LedgerError::Internal(ref m) if m.contains("adjust_quantity")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn row_not_found_is_internal() {
        let err = map_sqlx_error("append_entry", sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn sqlstates_classify_by_cause() {
        let cases = [
            ("40001", "conflict"),
            ("40P01", "conflict"),
            ("23505", "conflict"),
            ("23503", "conflict"),
            ("23514", "invalid_input"),
            ("22003", "invalid_input"),
            ("57014", "timeout"),
            ("08006", "internal"),
        ];
        for (sqlstate, expected) in cases {
            let err = database_error("adjust_quantity", Some(sqlstate), "boom");
            assert_eq!(err.code(), expected, "sqlstate {sqlstate}");
        }
        assert_eq!(database_error("begin", None, "boom").code(), "internal");
    }

    #[test]
    fn bigint_overflow_is_invalid_input() {
        let err = database_error("adjust_quantity", Some("22003"), "bigint out of range");
        assert!(matches!(err, LedgerError::InvalidInput(ref m) if m.contains("bigint out of range")));
        assert!(!err.is_retryable());
    }
}
