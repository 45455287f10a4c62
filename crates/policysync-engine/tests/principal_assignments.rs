use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_eq;
use policysync_client::InMemoryPolicyApi;
use policysync_core::{
    AccessPolicy, EngineError, Principal, PrincipalAttributes, PrincipalType, SourceDirectory,
};
use policysync_engine::{CancellationToken, GoneScope, ReconciliationEngine, RetryPolicy};
use serde_json::json;

async fn setup(policy: AccessPolicy) -> (Arc<InMemoryPolicyApi>, ReconciliationEngine) {
    let api = Arc::new(InMemoryPolicyApi::new());
    api.insert_policy(policy).await;
    let engine = ReconciliationEngine::new(
        api.clone(),
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
    );
    (api, engine)
}

fn shared_policy() -> AccessPolicy {
    AccessPolicy::new("pol-1")
        .with_metadata("name", json!("prod readers"))
        .with_principal(json!({"principal_id": "r-9", "principal_type": "ROLE", "principal_name": "ui-managed", "created_via": "console"}))
        .with_target("OTHER", json!({"workspace": "db-99", "method": "db_auth", "profile": {"roles": ["admin"]}}))
}

#[tokio::test]
async fn same_principal_id_with_different_types() {
    let (api, engine) = setup(shared_policy()).await;
    let cancel = CancellationToken::new();

    let user = engine
        .principals()
        .create(
            "pol-1",
            Principal::new("u-1", PrincipalType::User, "alice").with_directory("d-1", "corp"),
            &cancel,
        )
        .await
        .expect("create user");
    let role = engine
        .principals()
        .create(
            "pol-1",
            Principal::new("u-1", PrincipalType::Role, "alice-role"),
            &cancel,
        )
        .await
        .expect("create role");

    assert_eq!(user.id.to_string(), "pol-1:u-1:USER");
    assert_eq!(role.id.to_string(), "pol-1:u-1:ROLE");

    let after = api.policy("pol-1").await.expect("policy");
    assert_eq!(after.principals.len(), 3);
    assert_eq!(after.principals[0], shared_policy().principals[0]);
    assert_eq!(after.targets, shared_policy().targets);
}

#[tokio::test]
async fn principal_payloads_carry_no_target_categories() {
    let (api, engine) = setup(shared_policy()).await;
    engine
        .principals()
        .create(
            "pol-1",
            Principal::new("r-1", PrincipalType::Role, "dba"),
            &CancellationToken::new(),
        )
        .await
        .expect("create");

    let payload = api.last_payload().await.expect("payload");
    assert_json_eq!(
        serde_json::to_value(&payload).expect("serialize"),
        json!({
            "id": "pol-1",
            "name": "prod readers",
            "principals": [
                {"principal_id": "r-9", "principal_type": "ROLE", "principal_name": "ui-managed", "created_via": "console"},
                {"principal_id": "r-1", "principal_type": "ROLE", "principal_name": "dba"}
            ]
        })
    );
}

#[tokio::test]
async fn user_without_directory_is_rejected_locally() {
    let (api, engine) = setup(shared_policy()).await;
    let err = engine
        .principals()
        .create(
            "pol-1",
            Principal::new("g-1", PrincipalType::Group, "ops"),
            &CancellationToken::new(),
        )
        .await
        .expect_err("validation");
    assert!(matches!(err, EngineError::ValidationFailed { .. }));
    assert_eq!(api.get_calls(), 0);
}

#[tokio::test]
async fn create_rejects_ids_that_cannot_round_trip() {
    let (api, engine) = setup(shared_policy()).await;
    let cancel = CancellationToken::new();
    let cases = [("pol-1", ""), ("", "r-1"), ("pol-1", "r:1")];
    for (policy_id, principal_id) in cases {
        let err = engine
            .principals()
            .create(
                policy_id,
                Principal::new(principal_id, PrincipalType::Role, "dba"),
                &cancel,
            )
            .await
            .expect_err("invalid id");
        assert!(
            matches!(err, EngineError::ValidationFailed { .. }),
            "{policy_id:?} {principal_id:?}: {err}"
        );
    }
    assert_eq!(api.get_calls(), 0);
    assert_eq!(api.replace_calls(), 0);
}

#[tokio::test]
async fn duplicate_principal_conflicts() {
    let (api, engine) = setup(shared_policy()).await;
    let err = engine
        .principals()
        .create(
            "pol-1",
            Principal::new("r-9", PrincipalType::Role, "again"),
            &CancellationToken::new(),
        )
        .await
        .expect_err("conflict");
    assert!(err.is_conflict());
    assert_eq!(api.replace_calls(), 0);
}

#[tokio::test]
async fn update_keeps_server_side_keys() {
    let (api, engine) = setup(shared_policy()).await;
    let updated = engine
        .principals()
        .update(
            "pol-1:r-9:ROLE",
            PrincipalAttributes {
                principal_name: "renamed".into(),
                source_directory: None,
            },
            &CancellationToken::new(),
        )
        .await
        .expect("update");
    assert_eq!(updated.principal.principal_name, "renamed");

    let after = api.policy("pol-1").await.expect("policy");
    assert_json_eq!(
        after.principals[0],
        json!({"principal_id": "r-9", "principal_type": "ROLE", "principal_name": "renamed", "created_via": "console"})
    );
}

#[tokio::test]
async fn update_user_requires_directory() {
    let policy = shared_policy().with_principal(json!({
        "principal_id": "u-1", "principal_type": "USER", "principal_name": "alice",
        "source_directory_id": "d-1", "source_directory_name": "corp"
    }));
    let (api, engine) = setup(policy).await;
    let cancel = CancellationToken::new();

    let err = engine
        .principals()
        .update(
            "pol-1:u-1:USER",
            PrincipalAttributes {
                principal_name: "alice".into(),
                source_directory: None,
            },
            &cancel,
        )
        .await
        .expect_err("validation");
    assert!(matches!(err, EngineError::ValidationFailed { .. }));

    engine
        .principals()
        .update(
            "pol-1:u-1:USER",
            PrincipalAttributes {
                principal_name: "alice".into(),
                source_directory: Some(SourceDirectory {
                    id: "d-2".into(),
                    name: "partner".into(),
                }),
            },
            &cancel,
        )
        .await
        .expect("update");
    assert_eq!(api.replace_calls(), 1);
}

#[tokio::test]
async fn import_and_delete_principal() {
    let (api, engine) = setup(shared_policy()).await;
    let cancel = CancellationToken::new();

    let imported = engine
        .principals()
        .import("pol-1:r-9:ROLE", &cancel)
        .await
        .expect("import");
    assert_eq!(imported.principal.principal_name, "ui-managed");

    let err = engine
        .principals()
        .import("pol-1:r-9:ADMIN", &cancel)
        .await
        .expect_err("bad type");
    assert!(err.is_malformed_identifier());
    assert!(err.to_string().contains("ADMIN"));

    let err = engine
        .principals()
        .import("pol-1:r-9", &cancel)
        .await
        .expect_err("wrong arity");
    assert!(err.to_string().contains("2 parts found, 3 expected"));

    engine.principals().delete("pol-1:r-9:ROLE", &cancel).await.expect("delete");
    engine.principals().delete("pol-1:r-9:ROLE", &cancel).await.expect("delete again");
    assert_eq!(api.replace_calls(), 1);

    let outcome = engine.principals().read("pol-1:r-9:ROLE", &cancel).await.expect("read");
    assert_eq!(outcome.gone_scope(), Some(&GoneScope::Local));

    let err = engine
        .principals()
        .import("pol-1:r-9:ROLE", &cancel)
        .await
        .expect_err("gone");
    assert!(err.is_sub_resource_not_found());
}

#[tokio::test]
async fn list_skips_unreadable_entries() {
    let policy = shared_policy()
        .with_principal(json!({"principal_id": "x-1", "principal_type": "SERVICE", "principal_name": "bot"}))
        .with_principal(json!({"principal_id": "g-1", "principal_type": "GROUP", "principal_name": "ops", "source_directory_id": "d-1", "source_directory_name": "corp"}));
    let (_api, engine) = setup(policy).await;

    let listed = engine
        .principals()
        .list("pol-1", &CancellationToken::new())
        .await
        .expect("list");
    let ids: Vec<String> = listed.iter().map(|a| a.id.to_string()).collect();
    assert_eq!(ids, ["pol-1:r-9:ROLE", "pol-1:g-1:GROUP"]);
}
