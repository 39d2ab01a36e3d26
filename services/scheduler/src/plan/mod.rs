//! The plan hierarchy.
//!
//! Work is organized as Plan → Phase → Step. A step is the indivisible unit:
//! it owns a lifecycle state machine and exposes an offer requirement when
//! ready. Phases and plans are ordered containers whose status derives from
//! their children under a pluggable [`strategy::Strategy`].

pub mod coordinator;
pub mod manager;
pub mod phase;
pub mod plan;
pub mod scheduler;
pub mod step;
pub mod strategy;

use serde::{Deserialize, Serialize};

/// Status of a step or derived status of a container.
///
/// Steps report `Pending`/`Prepared`/`Starting`/`Complete`/`Error`;
/// `InProgress` and `Waiting` only appear as derived container statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet started.
    Pending,

    /// Started; an offer requirement is outstanding.
    Prepared,

    /// Offers were accepted with launches; awaiting task statuses.
    Starting,

    /// Some children have started but the container is not done.
    InProgress,

    /// All work done.
    Complete,

    /// The governing strategy is interrupted.
    Waiting,

    /// Validation failure; operator intervention required.
    Error,
}

impl Status {
    /// Whether this status represents work that is over, one way or another.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Complete | Status::Error)
    }

    /// Whether a child with this status is eligible to be a candidate.
    #[must_use]
    pub fn is_eligible(self) -> bool {
        matches!(self, Status::Pending | Status::Prepared)
    }

    /// Whether work has started but not completed.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, Status::Starting | Status::InProgress)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Prepared => "prepared",
            Status::Starting => "starting",
            Status::InProgress => "in_progress",
            Status::Complete => "complete",
            Status::Waiting => "waiting",
            Status::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Derive a container's status from its children.
///
/// ERROR dominates; a complete container stays complete even while
/// interrupted; otherwise interruption reports WAITING.
#[must_use]
pub fn join(children: &[Status], interrupted: bool) -> Status {
    if children.iter().any(|s| *s == Status::Error) {
        return Status::Error;
    }
    // A container with no children is vacuously done: an empty recovery plan
    // must not hold offers open.
    if children.iter().all(|s| *s == Status::Complete) {
        return Status::Complete;
    }
    if interrupted || children.iter().any(|s| *s == Status::Waiting) {
        return Status::Waiting;
    }
    if children.iter().any(|s| s.is_in_progress()) {
        return Status::InProgress;
    }
    // Mixed complete and not-yet-started children mean the container as a
    // whole is underway.
    if children.iter().any(|s| *s == Status::Complete)
        && children.iter().any(|s| *s != Status::Complete)
    {
        return Status::InProgress;
    }
    if children.iter().any(|s| *s == Status::Prepared) {
        return Status::Prepared;
    }
    Status::Pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_dominates() {
        assert_eq!(
            join(&[Status::Complete, Status::Error, Status::Pending], false),
            Status::Error
        );
    }

    #[test]
    fn test_all_complete() {
        assert_eq!(join(&[Status::Complete, Status::Complete], false), Status::Complete);
    }

    #[test]
    fn test_complete_stays_complete_while_interrupted() {
        assert_eq!(join(&[Status::Complete], true), Status::Complete);
    }

    #[test]
    fn test_interrupted_reports_waiting() {
        assert_eq!(join(&[Status::Pending, Status::Complete], true), Status::Waiting);
    }

    #[test]
    fn test_starting_child_means_in_progress() {
        assert_eq!(join(&[Status::Starting, Status::Pending], false), Status::InProgress);
    }

    #[test]
    fn test_mixed_complete_pending_means_in_progress() {
        assert_eq!(join(&[Status::Complete, Status::Pending], false), Status::InProgress);
    }

    #[test]
    fn test_prepared_without_progress() {
        assert_eq!(join(&[Status::Prepared, Status::Pending], false), Status::Prepared);
    }

    #[test]
    fn test_all_pending() {
        assert_eq!(join(&[Status::Pending, Status::Pending], false), Status::Pending);
    }

    #[test]
    fn test_empty_container_complete() {
        assert_eq!(join(&[], false), Status::Complete);
    }
}
