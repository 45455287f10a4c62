//! Target assignments: CRUD and import for one database-target grant inside
//! an access policy.

use policysync_core::{
    AccessPolicy, AuthProfile, EngineError, Operation, Target, TargetAssignmentId, TargetEnvelope,
    check_components,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::context::OpContext;
use crate::drift::{ReadOutcome, detect};
use crate::executor::WriteExecutor;
use crate::fetcher::AggregateFetcher;
use crate::locator::{decode_targets, locate_target};
use crate::planner::{Plan, TargetChange, plan_target};

/// A target assignment as it exists on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAssignment {
    pub id: TargetAssignmentId,
    /// Category the entry was found in.
    pub category: String,
    pub target: Target,
}

fn find(
    policy: &AccessPolicy,
    id: &TargetAssignmentId,
    ctx: &OpContext<'_>,
) -> Result<TargetAssignment, EngineError> {
    let location =
        locate_target(policy, &id.workspace_id).ok_or_else(|| ctx.sub_resource_not_found())?;
    let entry = &policy.targets[&location.category][location.index];
    let target = TargetEnvelope::from_entry(entry)
        .and_then(Target::from_envelope)
        .map_err(|err| ctx.fatal(format!("unreadable target entry: {err}")))?;
    Ok(TargetAssignment {
        id: id.clone(),
        category: location.category,
        target,
    })
}

fn missing_after_write(ctx: &OpContext<'_>, err: EngineError) -> EngineError {
    if err.is_sub_resource_not_found() {
        ctx.fatal("target missing from access policy after write")
    } else {
        err
    }
}

/// Target assignment operations.
#[derive(Clone)]
pub struct TargetAssignments {
    fetcher: AggregateFetcher,
    executor: WriteExecutor,
}

impl TargetAssignments {
    #[must_use]
    pub fn new(fetcher: AggregateFetcher, executor: WriteExecutor) -> Self {
        Self { fetcher, executor }
    }

    /// Adds `target` under the managed category.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for an empty policy or workspace ID, or one
    ///   containing the delimiter, before any network call
    /// - `Conflict` if the workspace already has a target in any category
    /// - `NotFoundParentAggregate` if the policy does not exist
    #[instrument(skip(self, target, cancel), fields(workspace_id = %target.workspace_id, method = %target.method()))]
    pub async fn create(
        &self,
        policy_id: &str,
        target: Target,
        cancel: &CancellationToken,
    ) -> Result<TargetAssignment, EngineError> {
        let id = TargetAssignmentId::new(policy_id, target.workspace_id.clone());
        let resource = id.to_string();
        let ctx = OpContext::new(Operation::Create, &resource, policy_id);

        check_components(&[
            ("policy ID", policy_id),
            ("workspace ID", target.workspace_id.as_str()),
        ])
        .map_err(|msg| ctx.validation(msg))?;

        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        let Plan::Write(payload) = plan_target(&policy, &TargetChange::Add(target), &ctx)? else {
            return Err(ctx.fatal("add produced no write"));
        };
        let updated = self.executor.execute(&ctx, &payload, cancel).await?;
        find(&updated, &id, &ctx).map_err(|err| missing_after_write(&ctx, err))
    }

    /// Re-fetches the policy and locates the assignment in any category.
    #[instrument(skip(self, cancel))]
    pub async fn read(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome<TargetAssignment>, EngineError> {
        let parsed = TargetAssignmentId::parse(id, Operation::Read)?;
        detect(self.fetch_existing(&parsed, id, Operation::Read, cancel).await)
    }

    /// Replaces the authentication method and profile of an existing target.
    ///
    /// # Errors
    ///
    /// - `NotFoundSubResource` if the workspace has no target
    /// - `Conflict` if the target is held in a category other than the
    ///   managed one
    #[instrument(skip(self, profile, cancel), fields(method = %profile.method()))]
    pub async fn update(
        &self,
        id: &str,
        profile: AuthProfile,
        cancel: &CancellationToken,
    ) -> Result<TargetAssignment, EngineError> {
        let parsed = TargetAssignmentId::parse(id, Operation::Update)?;
        let ctx = OpContext::new(Operation::Update, id, &parsed.policy_id);

        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        let change = TargetChange::Update {
            workspace_id: parsed.workspace_id.clone(),
            profile,
        };
        let payload = match plan_target(&policy, &change, &ctx)? {
            Plan::Write(payload) => payload,
            Plan::Noop(_) => {
                tracing::debug!(assignment_id = id, "target profile unchanged");
                return find(&policy, &parsed, &ctx);
            }
        };
        let updated = self.executor.execute(&ctx, &payload, cancel).await?;
        find(&updated, &parsed, &ctx).map_err(|err| missing_after_write(&ctx, err))
    }

    /// Removes the assignment from the managed category. Succeeds if it, or
    /// the whole policy, is already gone; a target held in another category
    /// is a `Conflict`.
    #[instrument(skip(self, cancel))]
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<(), EngineError> {
        let parsed = TargetAssignmentId::parse(id, Operation::Delete)?;
        let ctx = OpContext::new(Operation::Delete, id, &parsed.policy_id);

        let policy = match self.fetcher.fetch(&ctx, cancel).await {
            Ok(policy) => policy,
            Err(err) if err.is_parent_not_found() => {
                tracing::debug!(assignment_id = id, "access policy already gone");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let change = TargetChange::Remove {
            workspace_id: parsed.workspace_id.clone(),
        };
        let payload = match plan_target(&policy, &change, &ctx)? {
            Plan::Write(payload) => payload,
            Plan::Noop(_) => {
                tracing::debug!(assignment_id = id, "target already absent");
                return Ok(());
            }
        };
        let updated = match self.executor.execute(&ctx, &payload, cancel).await {
            Ok(updated) => updated,
            Err(err) if err.is_parent_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        if let Some(location) = locate_target(&updated, &parsed.workspace_id) {
            return Err(ctx.fatal(format!(
                "target still present in category {} after removal",
                location.category
            )));
        }
        Ok(())
    }

    /// Adopts an existing assignment from its raw composite identifier.
    #[instrument(skip(self, cancel))]
    pub async fn import(
        &self,
        raw_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TargetAssignment, EngineError> {
        let parsed = TargetAssignmentId::parse(raw_id, Operation::Import)?;
        self.fetch_existing(&parsed, raw_id, Operation::Import, cancel)
            .await
    }

    /// Lists every decodable target assignment of a policy, across all
    /// categories.
    #[instrument(skip(self, cancel))]
    pub async fn list(
        &self,
        policy_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TargetAssignment>, EngineError> {
        let ctx = OpContext::new(Operation::List, policy_id, policy_id);
        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        Ok(decode_targets(&policy)
            .into_iter()
            .map(|(category, target)| TargetAssignment {
                id: TargetAssignmentId::new(policy_id, target.workspace_id.clone()),
                category,
                target,
            })
            .collect())
    }

    async fn fetch_existing(
        &self,
        parsed: &TargetAssignmentId,
        id: &str,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<TargetAssignment, EngineError> {
        let ctx = OpContext::new(operation, id, &parsed.policy_id);
        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        find(&policy, parsed, &ctx)
    }
}
