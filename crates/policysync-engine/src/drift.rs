//! Distinguishes "the whole policy is gone" from "only this assignment is gone".

use policysync_core::EngineError;

/// How far an observed absence reaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoneScope {
    /// The access policy no longer exists. Every assignment under it is gone.
    Cascading { policy_id: String },
    /// The policy exists but this assignment is not in it.
    Local,
}

impl GoneScope {
    #[must_use]
    pub fn is_cascading(&self) -> bool {
        matches!(self, Self::Cascading { .. })
    }
}

/// Result of a read. `Gone` is not an error: the caller drops the record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    Present(T),
    Gone(GoneScope),
}

impl<T> ReadOutcome<T> {
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    #[must_use]
    pub fn present(self) -> Option<T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Gone(_) => None,
        }
    }

    #[must_use]
    pub fn gone_scope(&self) -> Option<&GoneScope> {
        match self {
            Self::Present(_) => None,
            Self::Gone(scope) => Some(scope),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadOutcome<U> {
        match self {
            Self::Present(value) => ReadOutcome::Present(f(value)),
            Self::Gone(scope) => ReadOutcome::Gone(scope),
        }
    }
}

/// Turns the result of a fetch-and-locate into a read outcome.
///
/// A missing policy becomes a cascading gone, a missing entry a local one.
/// Every other error passes through.
pub fn detect<T>(result: Result<T, EngineError>) -> Result<ReadOutcome<T>, EngineError> {
    match result {
        Ok(value) => Ok(ReadOutcome::Present(value)),
        Err(EngineError::NotFoundParentAggregate { policy_id, .. }) => {
            tracing::info!(policy_id = %policy_id, "access policy gone, dropping its assignments");
            Ok(ReadOutcome::Gone(GoneScope::Cascading { policy_id }))
        }
        Err(EngineError::NotFoundSubResource { resource, .. }) => {
            tracing::info!(assignment_id = %resource, "assignment gone");
            Ok(ReadOutcome::Gone(GoneScope::Local))
        }
        Err(err) => Err(err),
    }
}
