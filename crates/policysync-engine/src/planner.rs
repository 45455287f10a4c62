//! Computes replace payloads for single-assignment changes.
//!
//! A payload starts as a verbatim copy of the fetched policy's metadata and
//! principal list. Exactly one thing is then changed: one principal entry, or
//! one target entry inside one category. Target payloads carry only the
//! category being written; principal payloads carry no categories at all. The
//! backend leaves omitted categories untouched.
//!
//! In-place updates rewrite only the managed attribute keys of the existing
//! entry object, so keys the server added to that entry survive.

use indexmap::IndexMap;
use policysync_core::{
    AccessPolicy, AuthProfile, EngineError, MANAGED_TARGET_CATEGORY, PRINCIPAL_ATTRIBUTE_KEYS,
    Principal, PrincipalAttributes, PrincipalType, ReplacePayload, TARGET_ATTRIBUTE_KEYS, Target,
};
use serde_json::{Map, Value};

use crate::context::OpContext;
use crate::locator::{TargetLocation, locate_principal, locate_target};

/// A change to one principal assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalChange {
    Add(Principal),
    Update {
        principal_id: String,
        principal_type: PrincipalType,
        attributes: PrincipalAttributes,
    },
    Remove {
        principal_id: String,
        principal_type: PrincipalType,
    },
}

/// A change to one target assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    Add(Target),
    Update {
        workspace_id: String,
        profile: AuthProfile,
    },
    Remove {
        workspace_id: String,
    },
}

/// Why no write is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// Remove of an assignment that is not there.
    AlreadyAbsent,
    /// Update whose attributes already match.
    Unchanged,
}

/// Outcome of planning a change.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Write(ReplacePayload),
    Noop(NoopReason),
}

impl Plan {
    #[must_use]
    pub fn payload(&self) -> Option<&ReplacePayload> {
        match self {
            Self::Write(payload) => Some(payload),
            Self::Noop(_) => None,
        }
    }
}

fn base_payload(policy: &AccessPolicy) -> ReplacePayload {
    ReplacePayload {
        id: policy.id.clone(),
        metadata: policy.metadata.clone(),
        principals: policy.principals.clone(),
        targets: IndexMap::new(),
    }
}

/// Rewrites the `managed` keys of `existing` from `desired`, keeping every
/// other key and the original key order. Managed keys absent from `desired`
/// are dropped; new ones are appended.
fn merge_managed(existing: &Value, desired: &Value, managed: &[&str]) -> Value {
    let (Value::Object(existing), Value::Object(desired)) = (existing, desired) else {
        return desired.clone();
    };
    let mut merged = Map::new();
    for (key, value) in existing {
        if managed.contains(&key.as_str()) {
            if let Some(new_value) = desired.get(key) {
                merged.insert(key.clone(), new_value.clone());
            }
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    for key in managed {
        if !merged.contains_key(*key)
            && let Some(value) = desired.get(*key)
        {
            merged.insert((*key).to_string(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Plans a principal change against `policy`.
///
/// # Errors
///
/// - `Conflict` when adding an identity that already exists
/// - `NotFoundSubResource` when updating an identity that does not exist
pub fn plan_principal(
    policy: &AccessPolicy,
    change: &PrincipalChange,
    ctx: &OpContext<'_>,
) -> Result<Plan, EngineError> {
    let mut payload = base_payload(policy);
    match change {
        PrincipalChange::Add(principal) => {
            if locate_principal(policy, &principal.principal_id, principal.principal_type)
                .is_some()
            {
                return Err(ctx.conflict(format!(
                    "principal {} ({}) is already assigned to access policy {}",
                    principal.principal_id, principal.principal_type, policy.id
                )));
            }
            payload.principals.push(principal.to_entry());
        }
        PrincipalChange::Update {
            principal_id,
            principal_type,
            attributes,
        } => {
            let index = locate_principal(policy, principal_id, *principal_type)
                .ok_or_else(|| ctx.sub_resource_not_found())?;
            let existing = &policy.principals[index];
            let current = Principal::from_entry(existing).ok();
            if current
                .as_ref()
                .is_some_and(|p| p.attributes() == *attributes)
            {
                return Ok(Plan::Noop(NoopReason::Unchanged));
            }
            let desired = Principal::new(principal_id.clone(), *principal_type, "")
                .with_attributes(attributes.clone())
                .to_entry();
            payload.principals[index] = merge_managed(existing, &desired, PRINCIPAL_ATTRIBUTE_KEYS);
        }
        PrincipalChange::Remove {
            principal_id,
            principal_type,
        } => {
            let Some(index) = locate_principal(policy, principal_id, *principal_type) else {
                return Ok(Plan::Noop(NoopReason::AlreadyAbsent));
            };
            payload.principals.remove(index);
        }
    }
    Ok(Plan::Write(payload))
}

fn ensure_managed(
    location: &TargetLocation,
    workspace_id: &str,
    ctx: &OpContext<'_>,
) -> Result<(), EngineError> {
    if location.category == MANAGED_TARGET_CATEGORY {
        return Ok(());
    }
    Err(ctx.conflict(format!(
        "target for workspace {workspace_id} is held in category {}; only {MANAGED_TARGET_CATEGORY} is written",
        location.category
    )))
}

/// Plans a target change against `policy`.
///
/// Every write goes to [`MANAGED_TARGET_CATEGORY`] and the payload names no
/// other category. Targets found in any other category can be read but not
/// changed.
///
/// # Errors
///
/// - `Conflict` when adding a workspace that already has a target in any
///   category, or updating or removing a target held in another category
/// - `NotFoundSubResource` when updating a workspace with no target
pub fn plan_target(
    policy: &AccessPolicy,
    change: &TargetChange,
    ctx: &OpContext<'_>,
) -> Result<Plan, EngineError> {
    let mut payload = base_payload(policy);
    match change {
        TargetChange::Add(target) => {
            if let Some(location) = locate_target(policy, &target.workspace_id) {
                return Err(ctx.conflict(format!(
                    "workspace {} already has a target in category {} of access policy {}",
                    target.workspace_id, location.category, policy.id
                )));
            }
            let mut entries = policy
                .targets
                .get(MANAGED_TARGET_CATEGORY)
                .cloned()
                .unwrap_or_default();
            entries.push(target.to_entry());
            payload
                .targets
                .insert(MANAGED_TARGET_CATEGORY.to_string(), entries);
        }
        TargetChange::Update {
            workspace_id,
            profile,
        } => {
            let location =
                locate_target(policy, workspace_id).ok_or_else(|| ctx.sub_resource_not_found())?;
            ensure_managed(&location, workspace_id, ctx)?;
            let mut entries = policy.targets[&location.category].clone();
            let existing = &entries[location.index];
            let desired = Target::new(workspace_id.clone(), profile.clone());
            if Target::from_entry(existing).is_ok_and(|current| current == desired) {
                return Ok(Plan::Noop(NoopReason::Unchanged));
            }
            entries[location.index] =
                merge_managed(existing, &desired.to_entry(), TARGET_ATTRIBUTE_KEYS);
            payload.targets.insert(location.category, entries);
        }
        TargetChange::Remove { workspace_id } => {
            let Some(location) = locate_target(policy, workspace_id) else {
                return Ok(Plan::Noop(NoopReason::AlreadyAbsent));
            };
            ensure_managed(&location, workspace_id, ctx)?;
            let mut entries = policy.targets[&location.category].clone();
            entries.remove(location.index);
            payload.targets.insert(location.category, entries);
        }
    }
    tracing::debug!(
        policy_id = %policy.id,
        category = payload.written_category().unwrap_or("-"),
        "planned target write"
    );
    Ok(Plan::Write(payload))
}
