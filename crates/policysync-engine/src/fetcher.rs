//! Fetches the current state of an access policy.

use policysync_core::{AccessPolicy, DynPolicyApi, EngineError};
use tokio_util::sync::CancellationToken;

use crate::context::OpContext;
use crate::retry::RetryPolicy;

/// Retrieves whole policies, retrying transient failures.
///
/// A missing policy surfaces as [`EngineError::NotFoundParentAggregate`] on
/// the first 404/410 and is never retried.
#[derive(Clone)]
pub struct AggregateFetcher {
    api: DynPolicyApi,
    retry: RetryPolicy,
}

impl AggregateFetcher {
    #[must_use]
    pub fn new(api: DynPolicyApi, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub async fn fetch(
        &self,
        ctx: &OpContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<AccessPolicy, EngineError> {
        let policy_id = ctx.policy_id;
        let policy = self
            .retry
            .run(ctx, cancel, |_| self.api.get_policy(policy_id))
            .await
            .map_err(|failure| failure.into_engine_error(ctx))?;

        if policy.id != policy_id {
            return Err(ctx.fatal(format!(
                "requested access policy {policy_id} but received {}",
                policy.id
            )));
        }
        tracing::debug!(
            policy_id,
            principals = policy.principals.len(),
            categories = policy.targets.len(),
            "fetched access policy"
        );
        Ok(policy)
    }
}
