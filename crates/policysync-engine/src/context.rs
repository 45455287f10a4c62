use policysync_core::{EngineError, Operation};

/// What an engine call is doing, attached to every error and log line.
#[derive(Debug, Clone, Copy)]
pub struct OpContext<'a> {
    pub operation: Operation,
    /// Composite assignment ID, or the policy ID for policy-wide calls.
    pub resource: &'a str,
    pub policy_id: &'a str,
}

impl<'a> OpContext<'a> {
    #[must_use]
    pub fn new(operation: Operation, resource: &'a str, policy_id: &'a str) -> Self {
        Self {
            operation,
            resource,
            policy_id,
        }
    }

    #[must_use]
    pub fn conflict(&self, message: impl Into<String>) -> EngineError {
        EngineError::conflict(self.operation, self.resource, message)
    }

    #[must_use]
    pub fn validation(&self, message: impl Into<String>) -> EngineError {
        EngineError::validation(self.operation, self.resource, message)
    }

    #[must_use]
    pub fn fatal(&self, message: impl Into<String>) -> EngineError {
        EngineError::fatal(self.operation, self.resource, message)
    }

    #[must_use]
    pub fn sub_resource_not_found(&self) -> EngineError {
        EngineError::sub_resource_not_found(self.operation, self.resource)
    }

    #[must_use]
    pub fn parent_not_found(&self) -> EngineError {
        EngineError::parent_not_found(self.operation, self.resource, self.policy_id)
    }
}
