//! Authorization core - role composition and permission matching
//!
//! This module implements:
//! - Canonical grant lists for the user, leader and owner tiers
//! - Field-wise wildcard-or-exact matching of stored permissions

mod composer;
mod evaluator;

pub use composer::RoleComposer;
pub use evaluator::{check_perm, permission_matches};
