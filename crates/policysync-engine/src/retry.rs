//! Bounded exponential backoff for transient failures.
//!
//! Only [`ErrorClass::Transient`] failures are retried. Everything else is
//! returned on first occurrence. Cancellation is checked before each attempt,
//! raced against the in-flight call, and raced against each backoff sleep.

use std::future::Future;
use std::time::Duration;

use policysync_core::{EngineError, ErrorClass, TransportError, classify};
use tokio_util::sync::CancellationToken;

use crate::context::OpContext;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry budget for one fetch or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles on each further failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay, including server-provided hints.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Why a retried call ultimately failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// The last attempt failed with `error`; `class` says whether it was
    /// retryable and the budget ran out, or was returned immediately.
    Failed {
        error: TransportError,
        class: ErrorClass,
        attempts: u32,
    },
    /// The caller cancelled; no further attempts were made.
    Cancelled { attempts: u32 },
}

impl RetryFailure {
    /// Converts into the surfaced error for `ctx`.
    #[must_use]
    pub fn into_engine_error(self, ctx: &OpContext<'_>) -> EngineError {
        match self {
            Self::Failed {
                error,
                class,
                attempts,
            } => EngineError::from_class(
                class,
                ctx.operation,
                ctx.resource,
                ctx.policy_id,
                attempts,
                error.to_string(),
            ),
            Self::Cancelled { .. } => EngineError::cancelled(ctx.operation, ctx.resource),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the `attempt`-th failure (1-based), before any server hint.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay after a failure, honoring a `Retry-After` hint up to `max_delay`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, err: &TransportError) -> Duration {
        let backoff = self.backoff(attempt);
        match err.retry_after() {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }

    /// Runs `call` until it succeeds, fails non-transiently, runs out of
    /// attempts, or `cancel` fires. `call` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &OpContext<'_>,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryFailure::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryFailure::Cancelled { attempts: attempt });
                }
                result = call(attempt) => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let class = classify(&error);
            if !class.is_retryable() || attempt >= max_attempts {
                return Err(RetryFailure::Failed {
                    error,
                    class,
                    attempts: attempt,
                });
            }

            let delay = self.delay_after(attempt, &error);
            tracing::warn!(
                operation = %ctx.operation,
                resource = ctx.resource,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryFailure::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
