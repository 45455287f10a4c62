//! Finds assignments inside a fetched policy.
//!
//! Matching uses only the identity envelope of each entry, so an entry whose
//! attributes this crate cannot decode is still found (and still blocks a
//! duplicate add). Entries without a decodable identity are skipped and
//! logged.

use policysync_core::{
    AccessPolicy, MANAGED_TARGET_CATEGORY, Principal, PrincipalEnvelope, PrincipalType, Target,
    TargetEnvelope,
};

/// Position of a target entry: its category and index within that category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLocation {
    pub category: String,
    pub index: usize,
}

/// Returns the index of the principal with the given identity key.
#[must_use]
pub fn locate_principal(
    policy: &AccessPolicy,
    principal_id: &str,
    principal_type: PrincipalType,
) -> Option<usize> {
    policy
        .principals
        .iter()
        .enumerate()
        .find_map(|(index, entry)| match PrincipalEnvelope::from_entry(entry) {
            Ok(envelope) if envelope.matches(principal_id, principal_type) => Some(index),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(
                    policy_id = %policy.id,
                    index,
                    error = %err,
                    "skipping principal entry without a recognizable identity"
                );
                None
            }
        })
}

/// Returns where the target for `workspace_id` lives.
///
/// Every category is scanned, managed category first, then the others in
/// server order.
#[must_use]
pub fn locate_target(policy: &AccessPolicy, workspace_id: &str) -> Option<TargetLocation> {
    let managed = policy
        .targets
        .get_key_value(MANAGED_TARGET_CATEGORY)
        .into_iter();
    let others = policy
        .targets
        .iter()
        .filter(|(category, _)| category.as_str() != MANAGED_TARGET_CATEGORY);

    for (category, entries) in managed.chain(others) {
        for (index, entry) in entries.iter().enumerate() {
            match TargetEnvelope::from_entry(entry) {
                Ok(envelope) if envelope.workspace == workspace_id => {
                    return Some(TargetLocation {
                        category: category.clone(),
                        index,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        policy_id = %policy.id,
                        category = %category,
                        index,
                        error = %err,
                        "skipping target entry without a recognizable identity"
                    );
                }
            }
        }
    }
    None
}

/// Decodes every principal entry, skipping unrecognized shapes.
#[must_use]
pub fn decode_principals(policy: &AccessPolicy) -> Vec<Principal> {
    policy
        .principals
        .iter()
        .filter_map(|entry| match Principal::from_entry(entry) {
            Ok(principal) => Some(principal),
            Err(err) => {
                tracing::warn!(policy_id = %policy.id, error = %err, "skipping principal entry");
                None
            }
        })
        .collect()
}

/// Decodes every target entry across all categories, skipping unrecognized
/// shapes. Returns `(category, target)` pairs in server order.
#[must_use]
pub fn decode_targets(policy: &AccessPolicy) -> Vec<(String, Target)> {
    let mut out = Vec::new();
    for (category, entries) in &policy.targets {
        for entry in entries {
            match Target::from_entry(entry) {
                Ok(target) => out.push((category.clone(), target)),
                Err(err) => {
                    tracing::warn!(
                        policy_id = %policy.id,
                        category = %category,
                        error = %err,
                        "skipping target entry"
                    );
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy::new("pol-1")
            .with_principal(json!({"principal_id": "u-1", "principal_type": "USER", "principal_name": "alice", "source_directory_id": "d-1", "source_directory_name": "corp"}))
            .with_principal(json!("garbage"))
            .with_principal(json!({"principal_id": "u-1", "principal_type": "ROLE", "principal_name": "alice-role"}))
            .with_target("OTHER", json!({"workspace": "db-99", "method": "db_auth", "profile": {"roles": ["admin"]}}))
            .with_target("OTHER", json!({"workspace": "db-7", "method": "carrier_pigeon", "profile": {}}))
            .with_target("FQDN/IP", json!({"workspace": "db-42", "method": "db_auth", "profile": {"roles": ["reader"]}}))
            .with_target("FQDN/IP", json!({"no_workspace": true}))
    }

    #[test]
    fn test_locate_principal_by_id_and_type() {
        let policy = policy();
        assert_eq!(locate_principal(&policy, "u-1", PrincipalType::User), Some(0));
        assert_eq!(locate_principal(&policy, "u-1", PrincipalType::Role), Some(2));
        assert_eq!(locate_principal(&policy, "u-1", PrincipalType::Group), None);
        assert_eq!(locate_principal(&policy, "u-2", PrincipalType::User), None);
    }

    #[test]
    fn test_locate_target_scans_every_category() {
        let policy = policy();
        assert_eq!(
            locate_target(&policy, "db-42"),
            Some(TargetLocation {
                category: "FQDN/IP".into(),
                index: 0
            })
        );
        assert_eq!(
            locate_target(&policy, "db-99"),
            Some(TargetLocation {
                category: "OTHER".into(),
                index: 0
            })
        );
        // Unknown method: identity still matches.
        assert_eq!(
            locate_target(&policy, "db-7"),
            Some(TargetLocation {
                category: "OTHER".into(),
                index: 1
            })
        );
        assert_eq!(locate_target(&policy, "db-1"), None);
    }

    #[test]
    fn test_managed_category_wins_on_duplicates() {
        let policy = AccessPolicy::new("pol-1")
            .with_target("OTHER", json!({"workspace": "db-1", "method": "db_auth", "profile": {"roles": []}}))
            .with_target("FQDN/IP", json!({"workspace": "db-1", "method": "db_auth", "profile": {"roles": []}}));
        assert_eq!(locate_target(&policy, "db-1").unwrap().category, "FQDN/IP");
    }

    #[test]
    fn test_decode_skips_unrecognized_shapes() {
        let policy = policy();
        let principals = decode_principals(&policy);
        assert_eq!(principals.len(), 2);

        let targets = decode_targets(&policy);
        let workspaces: Vec<&str> = targets.iter().map(|(_, t)| t.workspace_id.as_str()).collect();
        assert_eq!(workspaces, ["db-99", "db-42"]);
        assert_eq!(targets[0].0, "OTHER");
    }
}
