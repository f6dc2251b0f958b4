use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: Role, permission: String },
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal.permissions();
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: principal.role,
            permission: required.as_str().to_string(),
        })
    }
}

/// Authorize a principal for every permission in `required`.
pub fn authorize_all(principal: &Principal, required: &[Permission]) -> Result<(), AuthzError> {
    for perm in required {
        authorize(principal, perm)?;
    }
    Ok(())
}
