//! Composite identifiers for assignments.
//!
//! Assignments have no ID of their own, so they are addressed by joining the
//! components of their identity key with [`ID_DELIMITER`]:
//!
//! - target assignment: `<policy_id>:<target_workspace_id>`
//! - principal assignment: `<policy_id>:<principal_id>:<principal_type>`
//!
//! Components are not escaped. Policy IDs, principal IDs and workspace IDs are
//! opaque UUID-like tokens and never contain the delimiter.

use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Operation};
use crate::model::PrincipalType;

pub const ID_DELIMITER: char = ':';

pub const TARGET_ID_FORMAT: &str = "aggregate_id:target_workspace_id";
pub const PRINCIPAL_ID_FORMAT: &str = "aggregate_id:principal_id:principal_type";

/// Number of components in a composite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// `policy_id:target_workspace_id`
    Target,
    /// `policy_id:principal_id:principal_type`
    Principal,
}

impl Arity {
    #[must_use]
    pub fn parts(self) -> usize {
        match self {
            Self::Target => 2,
            Self::Principal => 3,
        }
    }

    #[must_use]
    pub fn format(self) -> &'static str {
        match self {
            Self::Target => TARGET_ID_FORMAT,
            Self::Principal => PRINCIPAL_ID_FORMAT,
        }
    }
}

/// Joins identity components with the delimiter.
pub fn encode<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(ID_DELIMITER);
        }
        out.push_str(part.as_ref());
    }
    out
}

/// Checks that each labelled component would survive [`decode`]: non-empty
/// and free of the delimiter.
pub fn check_components(components: &[(&str, &str)]) -> Result<(), String> {
    for (label, value) in components {
        if value.is_empty() {
            return Err(format!("{label} must not be empty"));
        }
        if value.contains(ID_DELIMITER) {
            return Err(format!("{label} must not contain '{ID_DELIMITER}'"));
        }
    }
    Ok(())
}

/// Splits `id` and checks it has exactly `arity` non-empty components.
pub fn decode(id: &str, arity: Arity, operation: Operation) -> Result<Vec<String>, EngineError> {
    let parts: Vec<&str> = id.split(ID_DELIMITER).collect();
    let expected = arity.parts();
    if parts.len() != expected {
        return Err(EngineError::malformed_identifier(
            operation,
            id,
            format!("{} parts found, {} expected", parts.len(), expected),
        ));
    }
    if let Some(pos) = parts.iter().position(|p| p.is_empty()) {
        return Err(EngineError::malformed_identifier(
            operation,
            id,
            format!("component {} is empty", pos + 1),
        ));
    }
    Ok(parts.into_iter().map(str::to_string).collect())
}

/// Identifier of a target assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetAssignmentId {
    pub policy_id: String,
    pub workspace_id: String,
}

impl TargetAssignmentId {
    #[must_use]
    pub fn new(policy_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            workspace_id: workspace_id.into(),
        }
    }

    pub fn parse(id: &str, operation: Operation) -> Result<Self, EngineError> {
        let mut parts = decode(id, Arity::Target, operation)?.into_iter();
        match (parts.next(), parts.next()) {
            (Some(policy_id), Some(workspace_id)) => Ok(Self {
                policy_id,
                workspace_id,
            }),
            _ => Err(EngineError::malformed_identifier(
                operation,
                id,
                "missing components",
            )),
        }
    }
}

impl fmt::Display for TargetAssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&[&self.policy_id, &self.workspace_id]))
    }
}

impl FromStr for TargetAssignmentId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, Operation::Import)
    }
}

/// Identifier of a principal assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrincipalAssignmentId {
    pub policy_id: String,
    pub principal_id: String,
    pub principal_type: PrincipalType,
}

impl PrincipalAssignmentId {
    #[must_use]
    pub fn new(
        policy_id: impl Into<String>,
        principal_id: impl Into<String>,
        principal_type: PrincipalType,
    ) -> Self {
        Self {
            policy_id: policy_id.into(),
            principal_id: principal_id.into(),
            principal_type,
        }
    }

    pub fn parse(id: &str, operation: Operation) -> Result<Self, EngineError> {
        let mut parts = decode(id, Arity::Principal, operation)?.into_iter();
        let (Some(policy_id), Some(principal_id), Some(raw_type)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(EngineError::malformed_identifier(
                operation,
                id,
                "missing components",
            ));
        };
        let principal_type = raw_type.parse::<PrincipalType>().map_err(|_| {
            EngineError::malformed_identifier(
                operation,
                id,
                format!("unknown principal type \"{raw_type}\", expected USER, GROUP or ROLE"),
            )
        })?;
        Ok(Self {
            policy_id,
            principal_id,
            principal_type,
        })
    }
}

impl fmt::Display for PrincipalAssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&[
            self.policy_id.as_str(),
            self.principal_id.as_str(),
            self.principal_type.as_str(),
        ]))
    }
}

impl FromStr for PrincipalAssignmentId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, Operation::Import)
    }
}

/// Returns the policy component of any composite identifier.
#[must_use]
pub fn policy_id_of(id: &str) -> &str {
    id.split_once(ID_DELIMITER).map_or(id, |(policy, _)| policy)
}
