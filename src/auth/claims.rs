//! Effective claim resolution and the claim-based authorization check.

use std::collections::HashSet;

use crate::auth::types::{Claim, User};
use crate::errors::AuthError;
use crate::storage::AuthStorage;

/// Effective claim names of `user`: its role's claims merged with its direct claims.
pub async fn effective_claims(
    storage: &dyn AuthStorage,
    user: &User,
) -> Result<Vec<String>, AuthError> {
    let role_claims = match storage.get_role(user.role_id).await? {
        Some(role) => role.claims,
        None => {
            tracing::warn!(user_id = user.id, role_id = user.role_id, "user references a missing role");
            Vec::new()
        }
    };
    Ok(merge_claims(&role_claims, &user.claims))
}

/// Union of role claims and direct user claims, deduplicated by name.
///
/// First occurrence wins; callers must not rely on the order.
pub fn merge_claims(role_claims: &[Claim], user_claims: &[Claim]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(role_claims.len() + user_claims.len());
    role_claims
        .iter()
        .chain(user_claims)
        .filter(|claim| seen.insert(claim.name.as_str()))
        .map(|claim| claim.name.clone())
        .collect()
}

/// Allow iff every required claim is granted.
pub fn authorize<G, R>(granted: &[G], required: &[R]) -> bool
where
    G: AsRef<str>,
    R: AsRef<str>,
{
    let granted: HashSet<&str> = granted.iter().map(AsRef::as_ref).collect();
    required
        .iter()
        .all(|claim| granted.contains(claim.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(id: u64, name: &str) -> Claim {
        Claim {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_merge_deduplicates_by_name() {
        let merged = merge_claims(
            &[claim(1, "A"), claim(2, "B")],
            &[claim(2, "B"), claim(3, "C")],
        );
        let merged: HashSet<String> = merged.into_iter().collect();
        let expected: HashSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_merge_has_no_placeholder_entries() {
        assert!(merge_claims(&[], &[]).is_empty());
        assert_eq!(merge_claims(&[], &[claim(1, "A")]), vec!["A"]);
    }

    #[test]
    fn test_authorize() {
        let granted = ["user:read", "user:write"];
        assert!(authorize(&granted, &["user:read"]));
        assert!(authorize(&granted, &["user:read", "user:write"]));
        assert!(authorize::<_, &str>(&granted, &[]));
        assert!(!authorize(&granted, &["user:claims:set"]));
        assert!(!authorize::<&str, _>(&[], &["user:read"]));
    }
}
