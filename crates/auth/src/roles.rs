use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Permission;

/// Role of an actor in the stockroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages the catalogue and everything else.
    Admin,
    /// Books receipts and issues, reads the ledger and forecasts.
    StockOperator,
    /// End user at the till: browses stock and checks out scanned carts.
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::StockOperator => "stock_operator",
            Role::User => "user",
        }
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![Permission::WILDCARD],
            Role::StockOperator => vec![
                Permission::ITEMS_READ,
                Permission::LEDGER_RECORD,
                Permission::LEDGER_READ,
                Permission::FORECAST_READ,
                Permission::TREND_READ,
            ],
            Role::User => vec![
                Permission::ITEMS_READ,
                Permission::LEDGER_CHECKOUT,
                Permission::FORECAST_READ,
            ],
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}' (expected admin, stock_operator or user)")]
pub struct UnknownRole(pub String);

impl core::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "admin" => Ok(Role::Admin),
            "stock_operator" => Ok(Role::StockOperator),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
