//! `stockroom-auth`: role-based authorization policy.
//!
//! The ledger itself never authorizes. Callers resolve the actor's role from
//! their session layer and check the operation's permission here before
//! invoking a ledger operation. This crate is decoupled from transport and
//! storage.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize, authorize_all};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
