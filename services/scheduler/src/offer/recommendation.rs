//! Offer recommendations.
//!
//! A recommendation pairs one operation with the offer it targets. The
//! accepter groups recommendations by offer and submits them in order; the
//! evaluator guarantees that a recommendation list for one requirement
//! touches exactly one offer.

use armada_id::{AgentId, OfferId, TaskId};
use serde::{Deserialize, Serialize};

use super::{Resource, TaskInfo};

/// One operation to submit with an offer accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Reserve resources for the framework's role.
    Reserve { resources: Vec<Resource> },

    /// Release previously-reserved resources.
    Unreserve { resources: Vec<Resource> },

    /// Create persistent volumes on reserved disk.
    Create { volumes: Vec<Resource> },

    /// Destroy persistent volumes.
    Destroy { volumes: Vec<Resource> },

    /// Launch tasks using the offer's (possibly just-reserved) resources.
    Launch { tasks: Vec<TaskInfo> },
}

impl Operation {
    /// Task IDs launched by this operation, if it is a launch.
    pub fn launched_task_ids(&self) -> Vec<TaskId> {
        match self {
            Operation::Launch { tasks } => tasks.iter().map(|t| t.task_id.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Reserve { resources } => write!(f, "RESERVE({})", resources.len()),
            Operation::Unreserve { resources } => write!(f, "UNRESERVE({})", resources.len()),
            Operation::Create { volumes } => write!(f, "CREATE({})", volumes.len()),
            Operation::Destroy { volumes } => write!(f, "DESTROY({})", volumes.len()),
            Operation::Launch { tasks } => write!(f, "LAUNCH({})", tasks.len()),
        }
    }
}

/// An operation bound to the offer it should be submitted with.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRecommendation {
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub operation: Operation,
}

impl OfferRecommendation {
    #[must_use]
    pub fn new(offer_id: OfferId, agent_id: AgentId, operation: Operation) -> Self {
        Self {
            offer_id,
            agent_id,
            operation,
        }
    }
}

/// Collect the task IDs of every LAUNCH operation in a recommendation list.
pub fn launched_task_ids(recommendations: &[OfferRecommendation]) -> Vec<TaskId> {
    recommendations
        .iter()
        .flat_map(|r| r.operation.launched_task_ids())
        .collect()
}
