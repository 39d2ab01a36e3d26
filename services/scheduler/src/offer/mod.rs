//! The offer model and offer processing pipeline.
//!
//! Offers are time-bounded promises of resources on a specific agent. The
//! pipeline is: [`evaluator::OfferEvaluator`] matches a step's
//! [`requirement::OfferRequirement`] against a batch of offers and produces
//! [`recommendation::OfferRecommendation`]s; [`accepter::OfferAccepter`]
//! submits them to the driver and invokes operation recorders.
//!
//! These are boundary types: the cluster manager's wire encoding is converted
//! to and from these plain records at the driver, so everything inboard of it
//! is testable without a wire dependency.

pub mod accepter;
pub mod evaluator;
pub mod recommendation;
pub mod requirement;

use std::collections::BTreeMap;

use armada_id::{AgentId, OfferId, TaskId};
use armada_spec::{ConfigTarget, HealthCheckSpec, PodInstance, PortRange, ResourceValue};
use serde::{Deserialize, Serialize};

/// A resource offer from the cluster manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,

    /// Agent attributes, used by placement rules.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Offered resources, reserved and unreserved alike.
    pub resources: Vec<Resource>,
}

/// One concrete resource in an offer or assigned to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name as the cluster names it (`cpus`, `mem`, `ports`, `disk`).
    pub name: String,

    /// Amount: scalar or ranges.
    pub value: ResourceValue,

    /// Present when the resource is reserved for a role/principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,

    /// Present when the resource backs a persistent volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskInfo>,
}

impl Resource {
    /// Unreserved scalar resource.
    #[must_use]
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(value),
            reservation: None,
            disk: None,
        }
    }

    /// Unreserved ranges resource.
    #[must_use]
    pub fn ranges(name: impl Into<String>, ranges: Vec<PortRange>) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Ranges(ranges),
            reservation: None,
            disk: None,
        }
    }

    /// The scalar amount, if this is a scalar resource.
    #[must_use]
    pub fn scalar_value(&self) -> Option<f64> {
        match &self.value {
            ResourceValue::Scalar(v) => Some(*v),
            ResourceValue::Ranges(_) => None,
        }
    }

    /// Whether this resource is reserved for the given role and principal.
    #[must_use]
    pub fn reserved_for(&self, role: &str, principal: &str) -> bool {
        self.reservation
            .as_ref()
            .is_some_and(|r| r.role == role && r.principal == principal)
    }
}

/// Reservation metadata on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub role: String,
    pub principal: String,

    /// Stable label identifying this particular reservation, so it can be
    /// recognized when the agent offers it back.
    pub resource_id: String,
}

/// Persistent volume metadata on a disk resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Stable volume identifier.
    pub volume_id: String,

    /// Mount path inside the task container.
    pub container_path: String,
}

/// A launchable task description, produced by offer evaluation and persisted
/// by the launch recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub pod: PodInstance,
    pub agent_id: AgentId,
    pub command: String,

    /// The concrete resources assigned to the task, including any created
    /// volumes, with reservation labels filled in.
    pub resources: Vec<Resource>,

    /// Config generation the task was launched against.
    pub config_target: ConfigTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

/// Remove offers whose IDs appear in `accepted`.
#[must_use]
pub fn filter_out_accepted(offers: Vec<Offer>, accepted: &[OfferId]) -> Vec<Offer> {
    offers
        .into_iter()
        .filter(|o| !accepted.contains(&o.id))
        .collect()
}
