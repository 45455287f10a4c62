//! Entry point wiring the fetcher and executor into the assignment kinds.

use std::sync::Arc;

use policysync_client::{AuthHeader, ClientError, HttpPolicyClient};
use policysync_core::{DynPolicyApi, EngineError};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::drift::ReadOutcome;
use crate::executor::WriteExecutor;
use crate::fetcher::AggregateFetcher;
use crate::lifecycle::{AssignmentKind, AssignmentState, AssignmentTracker};
use crate::principal::PrincipalAssignments;
use crate::retry::RetryPolicy;
use crate::target::TargetAssignments;

/// Outcome of [`ReconciliationEngine::refresh`].
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Records confirmed present.
    pub present: Vec<String>,
    /// Records removed from the tracker because they are gone.
    pub dropped: Vec<String>,
    /// Records whose read failed; they stay tracked unchanged.
    pub errors: Vec<(String, EngineError)>,
}

/// Reconciles owned assignments inside shared access policies.
#[derive(Clone)]
pub struct ReconciliationEngine {
    principals: PrincipalAssignments,
    targets: TargetAssignments,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(api: DynPolicyApi, retry: RetryPolicy) -> Self {
        let fetcher = AggregateFetcher::new(api.clone(), retry);
        let executor = WriteExecutor::new(api, retry);
        Self {
            principals: PrincipalAssignments::new(fetcher.clone(), executor.clone()),
            targets: TargetAssignments::new(fetcher, executor),
        }
    }

    /// Builds an engine talking to the platform's REST API.
    pub fn from_config(
        config: &EngineConfig,
        auth: Option<AuthHeader>,
    ) -> Result<Self, ClientError> {
        let client = HttpPolicyClient::new(&config.client_config(), auth)?;
        Ok(Self::new(Arc::new(client), config.retry_policy()))
    }

    #[must_use]
    pub fn principals(&self) -> &PrincipalAssignments {
        &self.principals
    }

    #[must_use]
    pub fn targets(&self) -> &TargetAssignments {
        &self.targets
    }

    /// Re-reads every `Present` record in `tracker` and drops the gone ones.
    ///
    /// When a read finds the whole policy gone, every sibling under that
    /// policy is dropped without being read. Cancellation stops the refresh
    /// after recording the cancelled read as an error.
    pub async fn refresh(
        &self,
        tracker: &mut AssignmentTracker,
        cancel: &CancellationToken,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();
        let candidates: Vec<(String, AssignmentKind)> = tracker
            .iter()
            .filter(|(_, r)| r.state == AssignmentState::Present)
            .map(|(id, r)| (id.to_string(), r.kind))
            .collect();

        for (id, kind) in candidates {
            if tracker.state(&id) != Some(AssignmentState::Present) {
                continue;
            }
            let outcome = match kind {
                AssignmentKind::Principal => self
                    .principals
                    .read(&id, cancel)
                    .await
                    .map(|outcome| outcome.map(|_| ())),
                AssignmentKind::Target => self
                    .targets
                    .read(&id, cancel)
                    .await
                    .map(|outcome| outcome.map(|_| ())),
            };
            match outcome {
                Ok(ReadOutcome::Present(())) => report.present.push(id),
                Ok(ReadOutcome::Gone(scope)) => {
                    tracker.observe_gone(&id, &scope);
                }
                Err(err) => {
                    let cancelled = matches!(err, EngineError::Cancelled { .. });
                    report.errors.push((id, err));
                    if cancelled {
                        break;
                    }
                }
            }
        }

        report.dropped = tracker.drop_gone();
        tracing::info!(
            present = report.present.len(),
            dropped = report.dropped.len(),
            errors = report.errors.len(),
            "refreshed tracked assignments"
        );
        report
    }
}
