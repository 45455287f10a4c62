//! Principal assignments: CRUD and import for one principal grant inside an
//! access policy.

use policysync_core::{
    AccessPolicy, EngineError, Operation, Principal, PrincipalAssignmentId, PrincipalAttributes,
    check_components,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::context::OpContext;
use crate::drift::{ReadOutcome, detect};
use crate::executor::WriteExecutor;
use crate::fetcher::AggregateFetcher;
use crate::locator::{decode_principals, locate_principal};
use crate::planner::{Plan, PrincipalChange, plan_principal};

/// A principal assignment as it exists on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalAssignment {
    pub id: PrincipalAssignmentId,
    pub principal: Principal,
}

impl PrincipalAssignment {
    fn new(policy_id: &str, principal: Principal) -> Self {
        Self {
            id: PrincipalAssignmentId::new(
                policy_id,
                principal.principal_id.clone(),
                principal.principal_type,
            ),
            principal,
        }
    }
}

/// Reads the assignment for `id` out of `policy`.
fn find(
    policy: &AccessPolicy,
    id: &PrincipalAssignmentId,
    ctx: &OpContext<'_>,
) -> Result<PrincipalAssignment, EngineError> {
    let index = locate_principal(policy, &id.principal_id, id.principal_type)
        .ok_or_else(|| ctx.sub_resource_not_found())?;
    let principal = Principal::from_entry(&policy.principals[index])
        .map_err(|err| ctx.fatal(format!("unreadable principal entry: {err}")))?;
    Ok(PrincipalAssignment {
        id: id.clone(),
        principal,
    })
}

fn missing_after_write(ctx: &OpContext<'_>, err: EngineError) -> EngineError {
    if err.is_sub_resource_not_found() {
        ctx.fatal("principal missing from access policy after write")
    } else {
        err
    }
}

/// Principal assignment operations.
#[derive(Clone)]
pub struct PrincipalAssignments {
    fetcher: AggregateFetcher,
    executor: WriteExecutor,
}

impl PrincipalAssignments {
    #[must_use]
    pub fn new(fetcher: AggregateFetcher, executor: WriteExecutor) -> Self {
        Self { fetcher, executor }
    }

    /// Adds `principal` to the policy and returns the server's view of it.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for an empty policy or principal ID, one containing
    ///   the delimiter, or a USER or GROUP without a source directory, before
    ///   any network call
    /// - `Conflict` if the same (principal_id, principal_type) is already assigned
    /// - `NotFoundParentAggregate` if the policy does not exist
    #[instrument(skip(self, principal, cancel), fields(principal_id = %principal.principal_id, principal_type = %principal.principal_type))]
    pub async fn create(
        &self,
        policy_id: &str,
        principal: Principal,
        cancel: &CancellationToken,
    ) -> Result<PrincipalAssignment, EngineError> {
        let id = PrincipalAssignmentId::new(
            policy_id,
            principal.principal_id.clone(),
            principal.principal_type,
        );
        let resource = id.to_string();
        let ctx = OpContext::new(Operation::Create, &resource, policy_id);

        check_components(&[
            ("policy ID", policy_id),
            ("principal ID", principal.principal_id.as_str()),
        ])
        .map_err(|msg| ctx.validation(msg))?;
        principal.validate().map_err(|msg| ctx.validation(msg))?;

        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        let plan = plan_principal(&policy, &PrincipalChange::Add(principal), &ctx)?;
        let Plan::Write(payload) = plan else {
            return Err(ctx.fatal("add produced no write"));
        };
        let updated = self.executor.execute(&ctx, &payload, cancel).await?;

        find(&updated, &id, &ctx).map_err(|err| missing_after_write(&ctx, err))
    }

    /// Re-fetches the policy and locates the assignment.
    ///
    /// Absence is reported as [`ReadOutcome::Gone`], not as an error.
    #[instrument(skip(self, cancel))]
    pub async fn read(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome<PrincipalAssignment>, EngineError> {
        let parsed = PrincipalAssignmentId::parse(id, Operation::Read)?;
        detect(self.fetch_existing(&parsed, id, Operation::Read, cancel).await)
    }

    /// Replaces the non-identity attributes of an existing assignment.
    ///
    /// Keys the server stores on the entry beyond the managed attributes are
    /// kept. When nothing changes, no write is issued.
    #[instrument(skip(self, attributes, cancel))]
    pub async fn update(
        &self,
        id: &str,
        attributes: PrincipalAttributes,
        cancel: &CancellationToken,
    ) -> Result<PrincipalAssignment, EngineError> {
        let parsed = PrincipalAssignmentId::parse(id, Operation::Update)?;
        let ctx = OpContext::new(Operation::Update, id, &parsed.policy_id);

        Principal::new(parsed.principal_id.clone(), parsed.principal_type, "")
            .with_attributes(attributes.clone())
            .validate()
            .map_err(|msg| ctx.validation(msg))?;

        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        let change = PrincipalChange::Update {
            principal_id: parsed.principal_id.clone(),
            principal_type: parsed.principal_type,
            attributes: attributes.clone(),
        };
        let payload = match plan_principal(&policy, &change, &ctx)? {
            Plan::Write(payload) => payload,
            Plan::Noop(_) => {
                tracing::debug!(assignment_id = id, "principal attributes unchanged");
                return find(&policy, &parsed, &ctx);
            }
        };
        let updated = self.executor.execute(&ctx, &payload, cancel).await?;

        let assignment =
            find(&updated, &parsed, &ctx).map_err(|err| missing_after_write(&ctx, err))?;
        if assignment.principal.attributes() != attributes {
            tracing::warn!(
                assignment_id = id,
                "server stored principal attributes that differ from the request"
            );
        }
        Ok(assignment)
    }

    /// Removes the assignment. Succeeds if it, or the whole policy, is
    /// already gone.
    #[instrument(skip(self, cancel))]
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<(), EngineError> {
        let parsed = PrincipalAssignmentId::parse(id, Operation::Delete)?;
        let ctx = OpContext::new(Operation::Delete, id, &parsed.policy_id);

        let policy = match self.fetcher.fetch(&ctx, cancel).await {
            Ok(policy) => policy,
            Err(err) if err.is_parent_not_found() => {
                tracing::debug!(assignment_id = id, "access policy already gone");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let change = PrincipalChange::Remove {
            principal_id: parsed.principal_id.clone(),
            principal_type: parsed.principal_type,
        };
        let payload = match plan_principal(&policy, &change, &ctx)? {
            Plan::Write(payload) => payload,
            Plan::Noop(_) => {
                tracing::debug!(assignment_id = id, "principal already absent");
                return Ok(());
            }
        };
        let updated = match self.executor.execute(&ctx, &payload, cancel).await {
            Ok(updated) => updated,
            Err(err) if err.is_parent_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        if locate_principal(&updated, &parsed.principal_id, parsed.principal_type).is_some() {
            return Err(ctx.fatal("principal still present in access policy after removal"));
        }
        Ok(())
    }

    /// Adopts an existing assignment from its raw composite identifier.
    ///
    /// # Errors
    ///
    /// `MalformedIdentifier` naming both valid formats when `raw_id` is not a
    /// principal assignment ID, and a not-found error when the assignment
    /// does not exist.
    #[instrument(skip(self, cancel))]
    pub async fn import(
        &self,
        raw_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PrincipalAssignment, EngineError> {
        let parsed = PrincipalAssignmentId::parse(raw_id, Operation::Import)?;
        self.fetch_existing(&parsed, raw_id, Operation::Import, cancel)
            .await
    }

    /// Lists every decodable principal assignment of a policy.
    #[instrument(skip(self, cancel))]
    pub async fn list(
        &self,
        policy_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PrincipalAssignment>, EngineError> {
        let ctx = OpContext::new(Operation::List, policy_id, policy_id);
        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        Ok(decode_principals(&policy)
            .into_iter()
            .map(|principal| PrincipalAssignment::new(policy_id, principal))
            .collect())
    }

    async fn fetch_existing(
        &self,
        parsed: &PrincipalAssignmentId,
        id: &str,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<PrincipalAssignment, EngineError> {
        let ctx = OpContext::new(operation, id, &parsed.policy_id);
        let policy = self.fetcher.fetch(&ctx, cancel).await?;
        find(&policy, parsed, &ctx)
    }
}
