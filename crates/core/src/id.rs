//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Human-assigned unique identifier of a stock-keeping unit.
///
/// Always non-empty with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemCode(String);

impl ItemCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ItemCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemCode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::invalid("item code cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for ItemCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemCode> for String {
    fn from(value: ItemCode) -> Self {
        value.0
    }
}

/// Store-assigned, monotonically increasing id of a ledger row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of a checkout receipt.
///
/// Uses UUIDv7, so ids are unique across calls and sort by creation time.
/// Rendered as `BILL_<32 hex digits>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillId(Uuid);

const BILL_PREFIX: &str = "BILL_";

impl BillId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BillId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for BillId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{BILL_PREFIX}{}", self.0.simple())
    }
}

impl FromStr for BillId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(BILL_PREFIX).unwrap_or(s);
        let uuid = Uuid::from_str(raw)
            .map_err(|e| LedgerError::invalid(format!("BillId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl TryFrom<String> for BillId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillId> for String {
    fn from(value: BillId) -> Self {
        value.to_string()
    }
}
