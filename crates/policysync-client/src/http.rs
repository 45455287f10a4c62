//! HTTP transport for the access policy API.

use std::time::Duration;

use async_trait::async_trait;
use policysync_core::{AccessPolicy, PolicyApi, ReplacePayload, TransportError};
use serde_json::Value;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = concat!("policysync/", env!("CARGO_PKG_VERSION"));

/// Credentials attached to every request.
///
/// Acquiring and refreshing them is the caller's job.
#[derive(Debug, Clone)]
pub enum AuthHeader {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Settings for [`HttpPolicyClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Errors building an [`HttpPolicyClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// `PolicyApi` over the platform's REST endpoints:
/// `GET` and `PUT {base_url}/api/v1/access-policies/{id}`.
pub struct HttpPolicyClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<AuthHeader>,
}

impl HttpPolicyClient {
    pub fn new(config: &ClientConfig, auth: Option<AuthHeader>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Self::with_http_client(http, &config.base_url, auth)
    }

    /// Wraps a pre-configured `reqwest::Client`, e.g. one carrying default
    /// authentication headers.
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: &str,
        auth: Option<AuthHeader>,
    ) -> Result<Self, ClientError> {
        let base_url = parse_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn policy_url(&self, policy_id: &str) -> Url {
        let mut url = self.base_url.clone();
        // parse_base_url rejects cannot-be-a-base URLs
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "v1", "access-policies", policy_id]);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);
        match &self.auth {
            Some(AuthHeader::Basic { username, password }) => {
                req = req.basic_auth(username, Some(password));
            }
            Some(AuthHeader::Bearer { token }) => {
                req = req.bearer_auth(token);
            }
            None => {}
        }
        req.header("Accept", "application/json")
    }
}

#[async_trait]
impl PolicyApi for HttpPolicyClient {
    async fn get_policy(&self, policy_id: &str) -> Result<AccessPolicy, TransportError> {
        let url = self.policy_url(policy_id);
        tracing::debug!(policy_id, %url, "GET access policy");
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        handle_response(resp).await
    }

    async fn replace_policy(
        &self,
        policy_id: &str,
        payload: &ReplacePayload,
    ) -> Result<AccessPolicy, TransportError> {
        let url = self.policy_url(policy_id);
        tracing::debug!(
            policy_id,
            %url,
            category = payload.written_category().unwrap_or("-"),
            "PUT access policy"
        );
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        handle_response(resp).await
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw).map_err(|e| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            message: "expected an http(s) URL".into(),
        });
    }
    Ok(url)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::decode(err.to_string())
    } else {
        TransportError::network(err.to_string())
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<AccessPolicy, TransportError> {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.map_err(map_reqwest_error)?;

    if !status.is_success() {
        let mut err = TransportError::status(status.as_u16(), error_message(&body));
        if let Some(delay) = retry_after {
            err = err.with_retry_after(delay);
        }
        return Err(err);
    }

    serde_json::from_str(&body).map_err(|e| TransportError::decode(e.to_string()))
}

/// Only the delta-seconds form is honored; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pulls human-readable messages out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = json.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(errors) = json.get("errors").and_then(Value::as_array) {
            let msgs: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            if !msgs.is_empty() {
                return msgs.join("; ");
            }
        }
    }
    body.to_string()
}
