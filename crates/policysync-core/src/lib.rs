//! # policysync-core
//!
//! Shared model and contracts for reconciling owned assignments inside a
//! shared access policy.
//!
//! - [`model`]: the access policy, principals, targets and authentication profiles
//! - [`id`]: composite identifiers for assignments
//! - [`classify`]: transport failures and their classification
//! - [`error`]: the error taxonomy surfaced to consumers
//! - [`api`]: the [`PolicyApi`] transport trait

pub mod api;
pub mod classify;
pub mod error;
pub mod id;
pub mod model;

pub use api::{DynPolicyApi, PolicyApi};
pub use classify::{ErrorClass, TransportError, classify, classify_status};
pub use error::{EngineError, EngineResult, ErrorCategory, Operation};
pub use id::{
    Arity, ID_DELIMITER, PRINCIPAL_ID_FORMAT, PrincipalAssignmentId, TARGET_ID_FORMAT,
    TargetAssignmentId, check_components,
};
pub use model::{
    AccessPolicy, AuthMethod, AuthProfile, ClientCertificateProfile, DbAuthProfile,
    EphemeralUserProfile, IamTokenProfile, KerberosProfile, MANAGED_TARGET_CATEGORY,
    PRINCIPAL_ATTRIBUTE_KEYS, PasswordVaultProfile, Principal, PrincipalAttributes,
    PrincipalEnvelope, PrincipalType, ReplacePayload, ShapeError, SourceDirectory,
    TARGET_ATTRIBUTE_KEYS, Target, TargetEnvelope,
};
