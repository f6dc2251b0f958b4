//! Ledger error model.

use thiserror::Error;

use crate::id::ItemCode;

/// Result type used across the ledger layers.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every failure of a ledger operation is reported through this type; nothing
/// is swallowed and nothing is retried by the core. Storage adapters map their
/// driver errors onto these variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed or missing request fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The item code is not known to the stock store.
    #[error("item not found: {0}")]
    NotFound(ItemCode),

    /// An `issued` request would drive on-hand quantity negative.
    #[error("insufficient stock for {item_code}: requested {requested}, available {available}")]
    InsufficientStock {
        item_code: ItemCode,
        requested: i64,
        available: i64,
    },

    /// A concurrent writer won a race (serialization failure, deadlock,
    /// duplicate key, or a still-referenced row). Safe to retry as a whole.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store's statement or pool timeout fired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Storage unavailable or an unexpected driver failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// One line of a cart failed; the whole cart was rolled back.
    #[error("cart line {line} ({item_code}) rejected: {source}")]
    CartLine {
        /// Zero-based position of the failing line.
        line: usize,
        item_code: ItemCode,
        #[source]
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn not_found(code: &ItemCode) -> Self {
        Self::NotFound(code.clone())
    }

    /// Wrap `self` as the failure of cart line `line`.
    pub fn at_cart_line(self, line: usize, item_code: &ItemCode) -> Self {
        Self::CartLine {
            line,
            item_code: item_code.clone(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through cart-line wrapping.
    pub fn root(&self) -> &LedgerError {
        match self {
            LedgerError::CartLine { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the calling layer may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            LedgerError::Conflict(_) | LedgerError::Timeout(_)
        )
    }

    /// Stable machine-readable code for callers that render errors.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Timeout(_) => "timeout",
            LedgerError::Internal(_) => "internal",
            LedgerError::CartLine { source, .. } => source.code(),
        }
    }
}
