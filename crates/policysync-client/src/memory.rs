//! In-memory access policy backend.
//!
//! Behaves like the platform for the calls the engine makes: replace overwrites
//! metadata and principals, overwrites only the target categories named in the
//! payload, and rejects payloads naming more than one category. Failures can
//! be scripted per call kind, and every replace payload is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use policysync_core::{AccessPolicy, PolicyApi, ReplacePayload, TransportError};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

/// In-memory `PolicyApi`.
#[derive(Default)]
pub struct InMemoryPolicyApi {
    policies: RwLock<HashMap<String, AccessPolicy>>,
    get_failures: Mutex<VecDeque<TransportError>>,
    replace_failures: Mutex<VecDeque<TransportError>>,
    payloads: Mutex<Vec<ReplacePayload>>,
    get_calls: AtomicUsize,
    replace_calls: AtomicUsize,
}

impl InMemoryPolicyApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `policy`, replacing any policy with the same ID.
    pub async fn insert_policy(&self, policy: AccessPolicy) {
        self.policies.write().await.insert(policy.id.clone(), policy);
    }

    /// Deletes a policy together with everything embedded in it.
    pub async fn delete_policy(&self, policy_id: &str) -> bool {
        self.policies.write().await.remove(policy_id).is_some()
    }

    /// Returns the stored policy without counting a call.
    pub async fn policy(&self, policy_id: &str) -> Option<AccessPolicy> {
        self.policies.read().await.get(policy_id).cloned()
    }

    /// Makes the next `get_policy` call fail with `err`. Queued failures are
    /// consumed in order.
    pub async fn fail_next_get(&self, err: TransportError) {
        self.get_failures.lock().await.push_back(err);
    }

    /// Makes the next `replace_policy` call fail with `err`.
    pub async fn fail_next_replace(&self, err: TransportError) {
        self.replace_failures.lock().await.push_back(err);
    }

    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    /// Every payload received by `replace_policy`, in order.
    pub async fn payloads(&self) -> Vec<ReplacePayload> {
        self.payloads.lock().await.clone()
    }

    pub async fn last_payload(&self) -> Option<ReplacePayload> {
        self.payloads.lock().await.last().cloned()
    }
}

fn not_found(policy_id: &str) -> TransportError {
    TransportError::status(
        404,
        json!({ "message": format!("access policy {policy_id} not found") }).to_string(),
    )
}

#[async_trait]
impl PolicyApi for InMemoryPolicyApi {
    async fn get_policy(&self, policy_id: &str) -> Result<AccessPolicy, TransportError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.get_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.policies
            .read()
            .await
            .get(policy_id)
            .cloned()
            .ok_or_else(|| not_found(policy_id))
    }

    async fn replace_policy(
        &self,
        policy_id: &str,
        payload: &ReplacePayload,
    ) -> Result<AccessPolicy, TransportError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.replace_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.payloads.lock().await.push(payload.clone());

        if payload.targets.len() > 1 {
            return Err(TransportError::status(
                400,
                "only one target category may be supplied per request",
            ));
        }
        if payload.id != policy_id {
            return Err(TransportError::status(
                400,
                format!("payload id {} does not match {policy_id}", payload.id),
            ));
        }

        let mut policies = self.policies.write().await;
        let policy = policies
            .get_mut(policy_id)
            .ok_or_else(|| not_found(policy_id))?;
        policy.metadata = payload.metadata.clone();
        policy.principals = payload.principals.clone();
        for (category, entries) in &payload.targets {
            if entries.is_empty() {
                policy.targets.shift_remove(category);
            } else {
                policy.targets.insert(category.clone(), entries.clone());
            }
        }
        Ok(policy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::Map;

    fn payload(id: &str, categories: &[&str]) -> ReplacePayload {
        let mut targets = IndexMap::new();
        for c in categories {
            targets.insert((*c).to_string(), vec![json!({"workspace": "db-1"})]);
        }
        ReplacePayload {
            id: id.to_string(),
            metadata: Map::new(),
            principals: vec![],
            targets,
        }
    }

    #[tokio::test]
    async fn test_replace_leaves_omitted_categories() {
        let api = InMemoryPolicyApi::new();
        api.insert_policy(
            AccessPolicy::new("pol-1").with_target("OTHER", json!({"workspace": "db-99"})),
        )
        .await;

        let updated = api
            .replace_policy("pol-1", &payload("pol-1", &["FQDN/IP"]))
            .await
            .unwrap();
        assert_eq!(updated.targets.len(), 2);
        assert_eq!(updated.targets["OTHER"][0]["workspace"], "db-99");
        assert_eq!(api.replace_calls(), 1);
    }

    #[tokio::test]
    async fn test_replace_rejects_two_categories() {
        let api = InMemoryPolicyApi::new();
        api.insert_policy(AccessPolicy::new("pol-1")).await;
        let err = api
            .replace_policy("pol-1", &payload("pol-1", &["FQDN/IP", "OTHER"]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(400));
    }

    #[tokio::test]
    async fn test_missing_policy_is_404() {
        let api = InMemoryPolicyApi::new();
        assert_eq!(
            api.get_policy("nope").await.unwrap_err().status_code(),
            Some(404)
        );
        assert_eq!(
            api.replace_policy("nope", &payload("nope", &[]))
                .await
                .unwrap_err()
                .status_code(),
            Some(404)
        );
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let api = InMemoryPolicyApi::new();
        api.insert_policy(AccessPolicy::new("pol-1")).await;
        api.fail_next_get(TransportError::Timeout).await;
        api.fail_next_get(TransportError::status(503, "busy")).await;

        assert_eq!(api.get_policy("pol-1").await, Err(TransportError::Timeout));
        assert_eq!(
            api.get_policy("pol-1").await.unwrap_err().status_code(),
            Some(503)
        );
        assert!(api.get_policy("pol-1").await.is_ok());
        assert_eq!(api.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_category_is_removed() {
        let api = InMemoryPolicyApi::new();
        api.insert_policy(
            AccessPolicy::new("pol-1").with_target("FQDN/IP", json!({"workspace": "db-1"})),
        )
        .await;
        let mut p = payload("pol-1", &[]);
        p.targets.insert("FQDN/IP".into(), vec![]);
        let updated = api.replace_policy("pol-1", &p).await.unwrap();
        assert!(updated.targets.is_empty());
    }
}
