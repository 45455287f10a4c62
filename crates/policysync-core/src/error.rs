//! Engine error types.
//!
//! Every error surfaced to an assignment consumer is an [`EngineError`]. Each
//! variant names the attempted [`Operation`] and the resource involved (a
//! composite assignment ID or an access policy ID).

use std::fmt;

use crate::classify::ErrorClass;
use crate::id::{PRINCIPAL_ID_FORMAT, TARGET_ID_FORMAT};

/// The consumer-facing operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "read"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Import => write!(f, "import"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Errors returned by reconciliation operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A composite identifier has the wrong shape. Raised before any network call.
    #[error(
        "{operation}: malformed identifier \"{input}\": {reason}; valid formats are \"{target_format}\" (target assignment) and \"{principal_format}\" (principal assignment)",
        target_format = TARGET_ID_FORMAT,
        principal_format = PRINCIPAL_ID_FORMAT
    )]
    MalformedIdentifier {
        operation: Operation,
        /// The offending string.
        input: String,
        /// What was wrong with it, e.g. `3 parts found, 2 expected`.
        reason: String,
    },

    /// The access policy does not exist (never created, or deleted externally).
    #[error("{operation} {resource}: access policy {policy_id} not found")]
    NotFoundParentAggregate {
        operation: Operation,
        resource: String,
        policy_id: String,
    },

    /// The access policy exists but the assignment is absent from it.
    #[error("{operation} {resource}: assignment not found in access policy")]
    NotFoundSubResource { operation: Operation, resource: String },

    /// The assignment already exists, or the backend reported a conflict.
    #[error("{operation} {resource}: conflict: {message}")]
    Conflict {
        operation: Operation,
        resource: String,
        message: String,
    },

    /// The request was rejected as invalid. Never retried.
    #[error("{operation} {resource}: validation failed: {message}")]
    ValidationFailed {
        operation: Operation,
        resource: String,
        message: String,
    },

    /// A retryable failure persisted through every attempt.
    #[error("{operation} {resource}: transient failure after {attempts} attempt(s): {message}")]
    Transient {
        operation: Operation,
        resource: String,
        attempts: u32,
        message: String,
    },

    /// The credentials were rejected. Never retried.
    #[error("{operation} {resource}: authentication failed: {message}")]
    AuthFailure {
        operation: Operation,
        resource: String,
        message: String,
    },

    /// Anything that could not be classified.
    #[error("{operation} {resource}: {message}")]
    Fatal {
        operation: Operation,
        resource: String,
        message: String,
    },

    /// The caller cancelled the operation; remaining attempts were abandoned.
    #[error("{operation} {resource}: cancelled")]
    Cancelled { operation: Operation, resource: String },
}

impl EngineError {
    #[must_use]
    pub fn malformed_identifier(
        operation: Operation,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedIdentifier {
            operation,
            input: input.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn parent_not_found(
        operation: Operation,
        resource: impl Into<String>,
        policy_id: impl Into<String>,
    ) -> Self {
        Self::NotFoundParentAggregate {
            operation,
            resource: resource.into(),
            policy_id: policy_id.into(),
        }
    }

    #[must_use]
    pub fn sub_resource_not_found(operation: Operation, resource: impl Into<String>) -> Self {
        Self::NotFoundSubResource {
            operation,
            resource: resource.into(),
        }
    }

    #[must_use]
    pub fn conflict(
        operation: Operation,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            operation,
            resource: resource.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(
        operation: Operation,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ValidationFailed {
            operation,
            resource: resource.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn fatal(
        operation: Operation,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Fatal {
            operation,
            resource: resource.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cancelled(operation: Operation, resource: impl Into<String>) -> Self {
        Self::Cancelled {
            operation,
            resource: resource.into(),
        }
    }

    /// Builds the surfaced error for a classified transport failure.
    ///
    /// `NotFound` maps to [`EngineError::NotFoundParentAggregate`]: the only
    /// remote object the engine addresses directly is the access policy.
    #[must_use]
    pub fn from_class(
        class: ErrorClass,
        operation: Operation,
        resource: impl Into<String>,
        policy_id: &str,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        let resource = resource.into();
        let message = message.into();
        match class {
            ErrorClass::NotFound => Self::parent_not_found(operation, resource, policy_id),
            ErrorClass::Conflict => Self::conflict(operation, resource, message),
            ErrorClass::Validation => Self::validation(operation, resource, message),
            ErrorClass::Auth => Self::AuthFailure {
                operation,
                resource,
                message,
            },
            ErrorClass::Transient => Self::Transient {
                operation,
                resource,
                attempts,
                message,
            },
            ErrorClass::Fatal => Self::fatal(operation, resource, message),
        }
    }

    /// Returns `true` if the access policy itself is gone.
    #[must_use]
    pub fn is_parent_not_found(&self) -> bool {
        matches!(self, Self::NotFoundParentAggregate { .. })
    }

    /// Returns `true` if only the assignment is gone.
    #[must_use]
    pub fn is_sub_resource_not_found(&self) -> bool {
        matches!(self, Self::NotFoundSubResource { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    #[must_use]
    pub fn is_malformed_identifier(&self) -> bool {
        matches!(self, Self::MalformedIdentifier { .. })
    }

    /// Returns the operation the error was raised from.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::MalformedIdentifier { operation, .. }
            | Self::NotFoundParentAggregate { operation, .. }
            | Self::NotFoundSubResource { operation, .. }
            | Self::Conflict { operation, .. }
            | Self::ValidationFailed { operation, .. }
            | Self::Transient { operation, .. }
            | Self::AuthFailure { operation, .. }
            | Self::Fatal { operation, .. }
            | Self::Cancelled { operation, .. } => *operation,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedIdentifier { .. } => ErrorCategory::MalformedIdentifier,
            Self::NotFoundParentAggregate { .. } => ErrorCategory::ParentNotFound,
            Self::NotFoundSubResource { .. } => ErrorCategory::SubResourceNotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::ValidationFailed { .. } => ErrorCategory::Validation,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::AuthFailure { .. } => ErrorCategory::Auth,
            Self::Fatal { .. } => ErrorCategory::Fatal,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }
}

/// Categories of engine errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    MalformedIdentifier,
    ParentNotFound,
    SubResourceNotFound,
    Conflict,
    Validation,
    Transient,
    Auth,
    Fatal,
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedIdentifier => write!(f, "malformed_identifier"),
            Self::ParentNotFound => write!(f, "parent_not_found"),
            Self::SubResourceNotFound => write!(f, "sub_resource_not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Transient => write!(f, "transient"),
            Self::Auth => write!(f, "auth"),
            Self::Fatal => write!(f, "fatal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Type alias for an engine result.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_operation_and_resource() {
        let err = EngineError::parent_not_found(Operation::Read, "pol-1:db-42", "pol-1");
        assert_eq!(
            err.to_string(),
            "read pol-1:db-42: access policy pol-1 not found"
        );

        let err = EngineError::conflict(Operation::Create, "pol-1:u-1:USER", "already assigned");
        assert_eq!(
            err.to_string(),
            "create pol-1:u-1:USER: conflict: already assigned"
        );
    }

    #[test]
    fn test_malformed_identifier_shows_both_formats() {
        let err = EngineError::malformed_identifier(
            Operation::Import,
            "pol-1:db-42:EXTRA",
            "3 parts found, 2 expected",
        );
        let msg = err.to_string();
        assert!(msg.contains("\"pol-1:db-42:EXTRA\""));
        assert!(msg.contains("3 parts found, 2 expected"));
        assert!(msg.contains("aggregate_id:target_workspace_id"));
        assert!(msg.contains("aggregate_id:principal_id:principal_type"));
    }

    #[test]
    fn test_from_class() {
        let err = EngineError::from_class(
            ErrorClass::Transient,
            Operation::Update,
            "pol-1:db-42",
            "pol-1",
            3,
            "HTTP 503",
        );
        assert!(err.is_transient());
        assert_eq!(err.operation(), Operation::Update);
        assert!(err.to_string().contains("after 3 attempt(s)"));

        let err = EngineError::from_class(
            ErrorClass::NotFound,
            Operation::Delete,
            "pol-1:db-42",
            "pol-1",
            1,
            "HTTP 404",
        );
        assert!(err.is_parent_not_found());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            EngineError::sub_resource_not_found(Operation::Update, "pol-1:db-42").category(),
            ErrorCategory::SubResourceNotFound
        );
        assert_eq!(
            EngineError::cancelled(Operation::Create, "pol-1").category(),
            ErrorCategory::Cancelled
        );
        assert_eq!(ErrorCategory::ParentNotFound.to_string(), "parent_not_found");
    }
}
