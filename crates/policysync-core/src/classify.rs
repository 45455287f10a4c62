//! Transport failures and their classification.
//!
//! Transports report failures as [`TransportError`]. [`classify`] maps each one
//! to an [`ErrorClass`], which decides whether the retry loop tries again and
//! which [`EngineError`](crate::EngineError) variant is surfaced.

use std::fmt;
use std::time::Duration;

/// A failed call to the access policy API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Parsed `Retry-After` header, if the server sent one.
        retry_after: Option<Duration>,
    },

    /// The request never produced a response (connect, DNS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Attaches a server-provided retry hint.
    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        if let Self::Status { retry_after, .. } = &mut self {
            *retry_after = Some(delay);
        }
        self
    }

    /// Returns the `Retry-After` hint, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the HTTP status code, if the server answered.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The closed set of failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    Validation,
    Auth,
    Transient,
    Fatal,
}

impl ErrorClass {
    /// Only transient failures are worth another attempt.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Auth => write!(f, "auth"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classifies a transport failure.
#[must_use]
pub fn classify(err: &TransportError) -> ErrorClass {
    match err {
        TransportError::Status { status, .. } => classify_status(*status),
        TransportError::Network(_) | TransportError::Timeout => ErrorClass::Transient,
        TransportError::Decode(_) => ErrorClass::Fatal,
    }
}

/// Classifies a non-success HTTP status code.
#[must_use]
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        404 | 410 => ErrorClass::NotFound,
        409 => ErrorClass::Conflict,
        401 | 403 => ErrorClass::Auth,
        408 | 429 => ErrorClass::Transient,
        500..=599 => ErrorClass::Transient,
        400..=499 => ErrorClass::Validation,
        _ => ErrorClass::Fatal,
    }
}
