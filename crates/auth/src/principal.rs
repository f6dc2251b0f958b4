use serde::{Deserialize, Serialize};

use crate::{Permission, Role};

/// An authenticated actor as handed over by the session layer.
///
/// `actor` is the label recorded on ledger rows (`updated_by`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor: String,
    pub role: Role,
}

impl Principal {
    pub fn new(actor: impl Into<String>, role: Role) -> Self {
        Self {
            actor: actor.into(),
            role,
        }
    }

    /// Effective permissions (derived from the role).
    pub fn permissions(&self) -> Vec<Permission> {
        self.role.permissions()
    }
}
