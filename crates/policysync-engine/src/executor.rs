//! Issues whole-object replace calls.

use policysync_core::{AccessPolicy, DynPolicyApi, EngineError, ReplacePayload};
use tokio_util::sync::CancellationToken;

use crate::context::OpContext;
use crate::retry::RetryPolicy;

/// Sends planned payloads, retrying transient failures only.
///
/// Returns the server's post-write state so callers never report a locally
/// computed guess.
#[derive(Clone)]
pub struct WriteExecutor {
    api: DynPolicyApi,
    retry: RetryPolicy,
}

impl WriteExecutor {
    #[must_use]
    pub fn new(api: DynPolicyApi, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn execute(
        &self,
        ctx: &OpContext<'_>,
        payload: &ReplacePayload,
        cancel: &CancellationToken,
    ) -> Result<AccessPolicy, EngineError> {
        if payload.targets.len() > 1 {
            return Err(ctx.fatal(format!(
                "refusing to write {} target categories in one request",
                payload.targets.len()
            )));
        }
        if payload.id != ctx.policy_id {
            return Err(ctx.fatal(format!(
                "payload for {} addressed to access policy {}",
                payload.id, ctx.policy_id
            )));
        }

        let policy_id = ctx.policy_id;
        let updated = self
            .retry
            .run(ctx, cancel, |_| self.api.replace_policy(policy_id, payload))
            .await
            .map_err(|failure| failure.into_engine_error(ctx))?;

        tracing::info!(
            operation = %ctx.operation,
            resource = ctx.resource,
            policy_id,
            category = payload.written_category().unwrap_or("-"),
            "access policy replaced"
        );
        Ok(updated)
    }
}
