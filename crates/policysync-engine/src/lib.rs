//! # policysync-engine
//!
//! Safe partial mutation of access policies over a whole-object GET/PUT API.
//!
//! Every mutation is a read-modify-write of one assignment:
//!
//! ```text
//! fetch policy -> locate entry -> plan payload -> replace (with retry) -> verify
//! ```
//!
//! The plan copies everything the engine does not own verbatim, and writes at
//! most one target category per call. Reads distinguish a policy that is gone
//! (every assignment under it is gone) from a single missing entry.

pub mod config;
pub mod context;
pub mod drift;
pub mod engine;
pub mod executor;
pub mod fetcher;
pub mod lifecycle;
pub mod locator;
pub mod observability;
pub mod planner;
pub mod principal;
pub mod retry;
pub mod target;

pub use crate::config::{ApiConfig, EngineConfig, LoggingConfig, RetrySettings, loader::load_config};
pub use context::OpContext;
pub use drift::{GoneScope, ReadOutcome};
pub use engine::{ReconciliationEngine, RefreshReport};
pub use executor::WriteExecutor;
pub use fetcher::AggregateFetcher;
pub use lifecycle::{
    AssignmentKind, AssignmentState, AssignmentTracker, LifecycleError, LifecycleEvent,
};
pub use planner::{NoopReason, Plan, PrincipalChange, TargetChange};
pub use principal::{PrincipalAssignment, PrincipalAssignments};
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, RetryPolicy};
pub use target::{TargetAssignment, TargetAssignments};

pub use tokio_util::sync::CancellationToken;
