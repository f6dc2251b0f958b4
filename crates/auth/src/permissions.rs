use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "ledger.transactions.record").
/// A special wildcard permission `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const SCHEMA_MANAGE: Permission = Permission::from_static("admin.schema.manage");

    pub const ITEMS_READ: Permission = Permission::from_static("inventory.items.read");
    pub const ITEMS_CREATE: Permission = Permission::from_static("inventory.items.create");
    pub const ITEMS_EDIT: Permission = Permission::from_static("inventory.items.edit");
    pub const ITEMS_REMOVE: Permission = Permission::from_static("inventory.items.remove");

    pub const LEDGER_RECORD: Permission = Permission::from_static("ledger.transactions.record");
    pub const LEDGER_READ: Permission = Permission::from_static("ledger.transactions.read");
    pub const LEDGER_CHECKOUT: Permission = Permission::from_static("ledger.checkout");

    pub const FORECAST_READ: Permission = Permission::from_static("analytics.forecast.read");
    pub const TREND_READ: Permission = Permission::from_static("analytics.trend.read");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
