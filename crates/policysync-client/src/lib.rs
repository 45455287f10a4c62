//! # policysync-client
//!
//! Transports implementing [`PolicyApi`](policysync_core::PolicyApi):
//!
//! - [`HttpPolicyClient`]: the platform's REST API over `reqwest`
//! - [`InMemoryPolicyApi`]: an in-process backend for tests and local runs

pub mod http;
pub mod memory;

pub use http::{
    AuthHeader, ClientConfig, ClientError, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT,
    HttpPolicyClient,
};
pub use memory::InMemoryPolicyApi;
