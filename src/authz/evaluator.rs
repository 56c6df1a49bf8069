use crate::models::permission::{Permission, WILDCARD};

/// A stored field matches when it is the wildcard or equals the requested value exactly.
///
/// Only `"*"` is a wildcard; an empty stored value matches only an empty requested value.
fn field_matches(stored: &str, requested: &str) -> bool {
    stored == WILDCARD || stored == requested
}

/// Whether a single stored grant covers the requested triple.
pub fn permission_matches(stored: &Permission, requested: &Permission) -> bool {
    field_matches(&stored.resource, &requested.resource)
        && field_matches(&stored.action, &requested.action)
        && field_matches(&stored.filter, &requested.filter)
}

/// True iff any stored grant matches. Order of `stored` never changes the answer.
pub fn check_perm(stored: &[Permission], requested: &Permission) -> bool {
    match stored.iter().find(|perm| permission_matches(perm, requested)) {
        Some(granted_by) => {
            tracing::debug!(
                resource = %requested.resource,
                action = %requested.action,
                filter = %requested.filter,
                granted_by = ?granted_by,
                "permission match"
            );
            true
        }
        None => {
            tracing::debug!(
                resource = %requested.resource,
                action = %requested.action,
                filter = %requested.filter,
                "permission denied"
            );
            false
        }
    }
}
