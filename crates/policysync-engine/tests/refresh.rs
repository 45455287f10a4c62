use std::sync::Arc;
use std::time::Duration;

use policysync_client::InMemoryPolicyApi;
use policysync_core::{AccessPolicy, TransportError};
use policysync_engine::{
    AssignmentKind, AssignmentState, AssignmentTracker, CancellationToken, LifecycleEvent,
    ReconciliationEngine, RetryPolicy,
};
use serde_json::json;

fn policy(id: &str) -> AccessPolicy {
    AccessPolicy::new(id)
        .with_principal(json!({"principal_id": "u-1", "principal_type": "USER", "principal_name": "alice", "source_directory_id": "d-1", "source_directory_name": "corp"}))
        .with_target("FQDN/IP", json!({"workspace": "db-42", "method": "db_auth", "profile": {"roles": ["reader"]}}))
        .with_target("FQDN/IP", json!({"workspace": "db-43", "method": "kerberos", "profile": {"realm": "CORP", "service_principal": "pg/db-43"}}))
}

async fn setup() -> (Arc<InMemoryPolicyApi>, ReconciliationEngine, AssignmentTracker) {
    let api = Arc::new(InMemoryPolicyApi::new());
    api.insert_policy(policy("pol-1")).await;
    api.insert_policy(policy("pol-2")).await;
    let engine = ReconciliationEngine::new(
        api.clone(),
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
    );

    let mut tracker = AssignmentTracker::new();
    for policy_id in ["pol-1", "pol-2"] {
        tracker.track(format!("{policy_id}:db-42"), AssignmentKind::Target, AssignmentState::Present);
        tracker.track(format!("{policy_id}:db-43"), AssignmentKind::Target, AssignmentState::Present);
        tracker.track(
            format!("{policy_id}:u-1:USER"),
            AssignmentKind::Principal,
            AssignmentState::Present,
        );
    }
    (api, engine, tracker)
}

#[tokio::test]
async fn deleted_policy_drops_all_siblings_with_one_fetch() {
    let (api, engine, mut tracker) = setup().await;
    api.delete_policy("pol-1").await;

    let report = engine.refresh(&mut tracker, &CancellationToken::new()).await;

    assert_eq!(report.dropped, ["pol-1:db-42", "pol-1:db-43", "pol-1:u-1:USER"]);
    assert_eq!(report.present, ["pol-2:db-42", "pol-2:db-43", "pol-2:u-1:USER"]);
    assert!(report.errors.is_empty());
    // One fetch for pol-1, three for pol-2's records.
    assert_eq!(api.get_calls(), 4);
    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.state("pol-1:db-43"), None);
}

#[tokio::test]
async fn externally_removed_entry_is_dropped_alone() {
    let (api, engine, mut tracker) = setup().await;
    let cancel = CancellationToken::new();
    engine.targets().delete("pol-2:db-43", &cancel).await.expect("delete");

    let report = engine.refresh(&mut tracker, &cancel).await;
    assert_eq!(report.dropped, ["pol-2:db-43"]);
    assert_eq!(report.present.len(), 5);
    assert_eq!(api.replace_calls(), 1);
}

#[tokio::test]
async fn failed_reads_keep_records_tracked() {
    let (api, engine, mut tracker) = setup().await;
    api.fail_next_get(TransportError::status(401, "token expired")).await;

    let report = engine.refresh(&mut tracker, &CancellationToken::new()).await;
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "pol-1:db-42");
    assert!(report.dropped.is_empty());
    assert_eq!(tracker.state("pol-1:db-42"), Some(AssignmentState::Present));
}

#[tokio::test]
async fn tracked_lifecycle_of_a_created_target() {
    let api = Arc::new(InMemoryPolicyApi::new());
    api.insert_policy(AccessPolicy::new("pol-1")).await;
    let engine = ReconciliationEngine::new(api.clone(), RetryPolicy::no_retry());
    let cancel = CancellationToken::new();
    let mut tracker = AssignmentTracker::new();

    let id = "pol-1:db-42";
    tracker.track(id, AssignmentKind::Target, AssignmentState::Unmanaged);
    tracker.apply(id, LifecycleEvent::PlanCreate).expect("plan");
    let target = policysync_core::Target::new(
        "db-42",
        policysync_core::AuthProfile::DbAuth(policysync_core::DbAuthProfile {
            roles: vec!["reader".into()],
        }),
    );
    let event = match engine.targets().create("pol-1", target, &cancel).await {
        Ok(_) => LifecycleEvent::WriteSucceeded,
        Err(_) => LifecycleEvent::WriteFailed,
    };
    assert_eq!(tracker.apply(id, event), Ok(AssignmentState::Present));

    tracker.apply(id, LifecycleEvent::PlanDelete).expect("plan delete");
    engine.targets().delete(id, &cancel).await.expect("delete");
    assert_eq!(
        tracker.apply(id, LifecycleEvent::WriteSucceeded),
        Ok(AssignmentState::Gone)
    );
    assert_eq!(tracker.drop_gone(), [id]);
}
