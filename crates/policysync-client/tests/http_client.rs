use std::time::Duration;

use indexmap::IndexMap;
use policysync_client::{AuthHeader, ClientConfig, HttpPolicyClient};
use policysync_core::{ErrorClass, PolicyApi, ReplacePayload, TransportError, classify};
use serde_json::{Map, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpPolicyClient {
    HttpPolicyClient::new(
        &ClientConfig::new(server.uri()),
        Some(AuthHeader::Bearer {
            token: "test-token".into(),
        }),
    )
    .expect("client")
}

fn policy_body() -> serde_json::Value {
    json!({
        "id": "pol-1",
        "name": "prod readers",
        "principals": [
            {"principal_id": "r-1", "principal_type": "ROLE", "principal_name": "dba"}
        ],
        "targets": {
            "OTHER": [{"workspace": "db-99", "method": "db_auth", "profile": {"roles": ["admin"]}}]
        }
    })
}

#[tokio::test]
async fn get_policy_sends_bearer_token_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/access-policies/pol-1"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body()))
        .expect(1)
        .mount(&server)
        .await;

    let policy = client(&server).get_policy("pol-1").await.unwrap();
    assert_eq!(policy.id, "pol-1");
    assert_eq!(policy.metadata["name"], "prod readers");
    assert_eq!(policy.principals.len(), 1);
    assert_eq!(policy.targets["OTHER"][0]["workspace"], "db-99");
}

#[tokio::test]
async fn get_missing_policy_is_classified_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/access-policies/gone"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "policy not found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).get_policy("gone").await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.to_string(), "HTTP 404: policy not found");
    assert_eq!(classify(&err), ErrorClass::NotFound);
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/access-policies/pol-1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .mount(&server)
        .await;

    let err = client(&server).get_policy("pol-1").await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    assert_eq!(classify(&err), ErrorClass::Transient);
}

#[tokio::test]
async fn replace_policy_puts_payload_and_returns_server_state() {
    let server = MockServer::start().await;
    let mut targets = IndexMap::new();
    targets.insert(
        "FQDN/IP".to_string(),
        vec![json!({"workspace": "db-42", "method": "db_auth", "profile": {"roles": ["reader"]}})],
    );
    let mut metadata = Map::new();
    metadata.insert("name".into(), json!("prod readers"));
    let payload = ReplacePayload {
        id: "pol-1".into(),
        metadata,
        principals: vec![],
        targets,
    };

    Mock::given(method("PUT"))
        .and(path("/api/v1/access-policies/pol-1"))
        .and(body_json(json!({
            "id": "pol-1",
            "name": "prod readers",
            "principals": [],
            "targets": {
                "FQDN/IP": [{"workspace": "db-42", "method": "db_auth", "profile": {"roles": ["reader"]}}]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body()))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client(&server)
        .replace_policy("pol-1", &payload)
        .await
        .unwrap();
    // The server's answer is returned as-is, not the payload.
    assert_eq!(updated.targets["OTHER"].len(), 1);
}

#[tokio::test]
async fn validation_errors_join_messages() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{"message": "unknown workspace"}, {"message": "bad method"}]
        })))
        .mount(&server)
        .await;

    let payload = ReplacePayload {
        id: "pol-1".into(),
        metadata: Map::new(),
        principals: vec![],
        targets: IndexMap::new(),
    };
    let err = client(&server)
        .replace_policy("pol-1", &payload)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "HTTP 422: unknown workspace; bad method");
    assert_eq!(classify(&err), ErrorClass::Validation);
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).get_policy("pol-1").await.unwrap_err();
    assert!(matches!(err, TransportError::Decode(_)));
    assert_eq!(classify(&err), ErrorClass::Fatal);
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(policy_body())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let api = HttpPolicyClient::new(
        &ClientConfig::new(server.uri()).with_request_timeout(Duration::from_millis(50)),
        None,
    )
    .unwrap();
    let err = api.get_policy("pol-1").await.unwrap_err();
    assert_eq!(err, TransportError::Timeout);
}

#[tokio::test]
async fn basic_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Basic YWxpY2U6czNjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body()))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpPolicyClient::new(
        &ClientConfig::new(server.uri()),
        Some(AuthHeader::Basic {
            username: "alice".into(),
            password: "s3cret".into(),
        }),
    )
    .unwrap();
    api.get_policy("pol-1").await.unwrap();
}
