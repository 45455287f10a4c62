//! Transport contract for the access policy API.
//!
//! The platform exposes whole-object fetch and whole-object replace only.
//! Implementations must be thread-safe and already authenticated; the engine
//! never acquires or refreshes credentials.

use std::sync::Arc;

use async_trait::async_trait;

use crate::classify::TransportError;
use crate::model::{AccessPolicy, ReplacePayload};

/// Whole-object access to access policies.
///
/// # Example
///
/// ```ignore
/// use policysync_core::{PolicyApi, TransportError};
///
/// async fn principal_count(api: &dyn PolicyApi, id: &str) -> Result<usize, TransportError> {
///     Ok(api.get_policy(id).await?.principals.len())
/// }
/// ```
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Fetches the full current policy.
    ///
    /// # Errors
    ///
    /// A missing policy is reported as `TransportError::Status` with status 404.
    async fn get_policy(&self, policy_id: &str) -> Result<AccessPolicy, TransportError>;

    /// Replaces the policy and returns the server's post-write state.
    ///
    /// Target categories omitted from `payload` are left as they are.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Status` with status 400 if `payload` names more
    /// than one target category.
    async fn replace_policy(
        &self,
        policy_id: &str,
        payload: &ReplacePayload,
    ) -> Result<AccessPolicy, TransportError>;
}

/// Type alias for a shareable transport handle.
pub type DynPolicyApi = Arc<dyn PolicyApi>;
