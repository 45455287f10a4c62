//! Per-assignment lifecycle state machine and a host-side tracker.
//!
//! ```text
//! Unmanaged --PlanCreate--> PlannedCreate --WriteSucceeded--> Present
//! Present   --PlanUpdate--> PlannedUpdate --WriteSucceeded--> Present
//! Present   --PlanDelete--> PlannedDelete --WriteSucceeded--> Gone
//! Present   --ObservedAbsent--> Gone
//! ```
//!
//! A failed write returns the record to where it was before planning. `Gone`
//! is terminal.

use std::fmt;

use indexmap::IndexMap;
use policysync_core::id::policy_id_of;

use crate::drift::GoneScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentKind {
    Principal,
    Target,
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Principal => write!(f, "principal"),
            Self::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentState {
    Unmanaged,
    PlannedCreate,
    Present,
    PlannedUpdate,
    PlannedDelete,
    Gone,
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmanaged => write!(f, "unmanaged"),
            Self::PlannedCreate => write!(f, "planned_create"),
            Self::Present => write!(f, "present"),
            Self::PlannedUpdate => write!(f, "planned_update"),
            Self::PlannedDelete => write!(f, "planned_delete"),
            Self::Gone => write!(f, "gone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PlanCreate,
    PlanUpdate,
    PlanDelete,
    WriteSucceeded,
    WriteFailed,
    ObservedAbsent,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanCreate => write!(f, "plan_create"),
            Self::PlanUpdate => write!(f, "plan_update"),
            Self::PlanDelete => write!(f, "plan_delete"),
            Self::WriteSucceeded => write!(f, "write_succeeded"),
            Self::WriteFailed => write!(f, "write_failed"),
            Self::ObservedAbsent => write!(f, "observed_absent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid transition from {from} on {event}")]
    InvalidTransition {
        from: AssignmentState,
        event: LifecycleEvent,
    },

    #[error("assignment {0} is not tracked")]
    Untracked(String),
}

impl AssignmentState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Gone
    }

    /// Applies `event`, returning the next state.
    pub fn transition(self, event: LifecycleEvent) -> Result<Self, LifecycleError> {
        use AssignmentState as S;
        use LifecycleEvent as E;

        let next = match (self, event) {
            (S::Unmanaged, E::PlanCreate) => S::PlannedCreate,
            (S::PlannedCreate, E::WriteSucceeded) => S::Present,
            (S::PlannedCreate, E::WriteFailed) => S::Unmanaged,

            (S::Present, E::PlanUpdate) => S::PlannedUpdate,
            (S::PlannedUpdate, E::WriteSucceeded | E::WriteFailed) => S::Present,

            (S::Present, E::PlanDelete) => S::PlannedDelete,
            (S::PlannedDelete, E::WriteSucceeded) => S::Gone,
            (S::PlannedDelete, E::WriteFailed) => S::Present,

            (S::Present | S::PlannedUpdate | S::PlannedDelete, E::ObservedAbsent) => S::Gone,

            (from, event) => return Err(LifecycleError::InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAssignment {
    pub kind: AssignmentKind,
    pub state: AssignmentState,
}

/// Lifecycle states of the assignments a host manages, keyed by composite ID.
///
/// Iteration follows insertion order.
#[derive(Debug, Default, Clone)]
pub struct AssignmentTracker {
    records: IndexMap<String, TrackedAssignment>,
}

impl AssignmentTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `id` in `state`, replacing any previous record.
    pub fn track(&mut self, id: impl Into<String>, kind: AssignmentKind, state: AssignmentState) {
        self.records.insert(id.into(), TrackedAssignment { kind, state });
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TrackedAssignment> {
        self.records.get(id)
    }

    #[must_use]
    pub fn state(&self, id: &str) -> Option<AssignmentState> {
        self.records.get(id).map(|r| r.state)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrackedAssignment)> {
        self.records.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// Applies `event` to one record.
    pub fn apply(
        &mut self,
        id: &str,
        event: LifecycleEvent,
    ) -> Result<AssignmentState, LifecycleError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| LifecycleError::Untracked(id.to_string()))?;
        record.state = record.state.transition(event)?;
        Ok(record.state)
    }

    /// Records that `id` was observed gone and returns every ID newly marked.
    ///
    /// A cascading scope marks every tracked record of the same policy without
    /// looking at them individually.
    pub fn observe_gone(&mut self, id: &str, scope: &GoneScope) -> Vec<String> {
        let mut marked = Vec::new();
        match scope {
            GoneScope::Local => {
                if let Some(record) = self.records.get_mut(id)
                    && record.state != AssignmentState::Gone
                {
                    record.state = AssignmentState::Gone;
                    marked.push(id.to_string());
                }
            }
            GoneScope::Cascading { policy_id } => {
                for (sibling, record) in &mut self.records {
                    if policy_id_of(sibling) == policy_id && record.state != AssignmentState::Gone
                    {
                        record.state = AssignmentState::Gone;
                        marked.push(sibling.clone());
                    }
                }
                tracing::debug!(
                    policy_id = %policy_id,
                    dropped = marked.len(),
                    "cascading removal of tracked assignments"
                );
            }
        }
        marked
    }

    /// Removes every record in the terminal state and returns their IDs.
    pub fn drop_gone(&mut self) -> Vec<String> {
        let gone: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        self.records.retain(|_, r| !r.state.is_terminal());
        gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use AssignmentState as S;
    use LifecycleEvent as E;

    #[test]
    fn test_happy_path() {
        let mut state = S::Unmanaged;
        for (event, expected) in [
            (E::PlanCreate, S::PlannedCreate),
            (E::WriteSucceeded, S::Present),
            (E::PlanUpdate, S::PlannedUpdate),
            (E::WriteSucceeded, S::Present),
            (E::PlanDelete, S::PlannedDelete),
            (E::WriteSucceeded, S::Gone),
        ] {
            state = state.transition(event).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_failed_writes_roll_back() {
        assert_eq!(S::PlannedCreate.transition(E::WriteFailed).unwrap(), S::Unmanaged);
        assert_eq!(S::PlannedUpdate.transition(E::WriteFailed).unwrap(), S::Present);
        assert_eq!(S::PlannedDelete.transition(E::WriteFailed).unwrap(), S::Present);
    }

    #[test]
    fn test_external_removal() {
        assert_eq!(S::Present.transition(E::ObservedAbsent).unwrap(), S::Gone);
    }

    #[test]
    fn test_gone_is_terminal() {
        for event in [E::PlanCreate, E::PlanUpdate, E::WriteSucceeded, E::ObservedAbsent] {
            assert!(S::Gone.transition(event).is_err());
        }
        let err = S::Unmanaged.transition(E::PlanDelete).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition from unmanaged on plan_delete");
    }

    #[test]
    fn test_cascade_marks_only_same_policy() {
        let mut tracker = AssignmentTracker::new();
        tracker.track("pol-1:db-42", AssignmentKind::Target, S::Present);
        tracker.track("pol-1:u-1:USER", AssignmentKind::Principal, S::Present);
        tracker.track("pol-10:db-42", AssignmentKind::Target, S::Present);

        let marked = tracker.observe_gone(
            "pol-1:db-42",
            &GoneScope::Cascading {
                policy_id: "pol-1".into(),
            },
        );
        assert_eq!(marked, ["pol-1:db-42", "pol-1:u-1:USER"]);
        assert_eq!(tracker.state("pol-10:db-42"), Some(S::Present));

        assert_eq!(tracker.drop_gone(), ["pol-1:db-42", "pol-1:u-1:USER"]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_apply_untracked() {
        let mut tracker = AssignmentTracker::new();
        assert_eq!(
            tracker.apply("pol-1:db-1", E::PlanCreate),
            Err(LifecycleError::Untracked("pol-1:db-1".into()))
        );
    }
}
