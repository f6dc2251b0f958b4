//! Checkout carts: ordered transaction lists applied as one unit.

use serde::{Deserialize, Serialize};

use stockroom_core::{BillId, LedgerError, LedgerResult};

use crate::transaction::{LedgerEntry, TransactionRequest};

/// A validated, non-empty, ordered list of transaction requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<TransactionRequest>,
    total_amount: i64,
}

impl Cart {
    /// Validate every line up front and compute the cart total.
    ///
    /// A failing line is reported with its position and item code.
    pub fn new(lines: Vec<TransactionRequest>) -> LedgerResult<Self> {
        if lines.is_empty() {
            return Err(LedgerError::invalid("cart cannot be empty"));
        }

        let mut total_amount: i64 = 0;
        for (idx, line) in lines.iter().enumerate() {
            line.validate()
                .map_err(|e| e.at_cart_line(idx, &line.item_code))?;
            total_amount = line
                .amount()
                .and_then(|amount| {
                    total_amount
                        .checked_add(amount)
                        .ok_or_else(|| LedgerError::invalid("cart total overflows"))
                })
                .map_err(|e| e.at_cart_line(idx, &line.item_code))?;
        }

        Ok(Self {
            lines,
            total_amount,
        })
    }

    pub fn lines(&self) -> &[TransactionRequest] {
        &self.lines
    }

    /// Σ `quantity * unit_price` over all lines.
    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }

    /// Stamp every line with the same actor label.
    pub fn with_actor(mut self, actor: Option<&str>) -> Self {
        if let Some(actor) = actor {
            for line in &mut self.lines {
                line.actor = Some(actor.to_string());
            }
        }
        self
    }
}

/// A barcode scanned at the till, resolved to an item before checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLine {
    pub barcode: String,
    pub quantity: i64,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub bill_id: BillId,
    /// Price in smallest currency unit (e.g., cents).
    pub total_amount: i64,
    pub entries: Vec<LedgerEntry>,
}
