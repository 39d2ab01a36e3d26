//! Offer requirements.
//!
//! An offer requirement is the immutable, pod-derived description of what a
//! step needs from one offer: per-task resource asks, placement, and the
//! config target the launch will be stamped with.

use armada_id::TaskId;
use armada_spec::{
    ConfigTarget, HealthCheckSpec, PlacementRule, PodInstance, ResourceSpec, VolumeSpec,
};

use super::Resource;

/// What one step needs from a single offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRequirement {
    /// Pod this requirement deploys.
    pub pod: PodInstance,

    /// Config generation the launched tasks will carry.
    pub config_target: ConfigTarget,

    /// Role reservations are made for.
    pub role: String,

    /// Principal reservations are made under.
    pub principal: String,

    /// Placement constraint for the whole pod.
    pub placement: Option<PlacementRule>,

    /// Per-task asks, launched together from the matched offer.
    pub tasks: Vec<TaskRequirement>,

    /// Stale reserved resources to tear down (DESTROY volumes, then
    /// UNRESERVE) before re-reserving. Only set for permanent recovery; the
    /// requirement then only matches offers carrying these resources.
    pub teardown: Vec<Resource>,

    /// Live task launches to kill before the new launch goes out, e.g. tasks
    /// still running an outdated config generation.
    pub kill_first: Vec<TaskId>,
}

impl OfferRequirement {
    /// All task IDs this requirement would launch.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(|t| &t.task_id)
    }
}

/// Resource asks for one task within a requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequirement {
    /// Freshly-minted ID for this launch attempt.
    pub task_id: TaskId,

    /// Task name from the specification.
    pub name: String,

    /// Command the executor runs.
    pub command: String,

    /// Resource asks (cpus, mem, ports).
    pub resources: Vec<ResourceSpec>,

    /// Persistent volumes the task requires.
    pub volumes: Vec<VolumeSpec>,

    /// Task-level placement, checked in addition to the pod's.
    pub placement: Option<PlacementRule>,

    pub health_check: Option<HealthCheckSpec>,
}
