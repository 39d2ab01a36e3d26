//! Service specification data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::placement::PlacementRule;

/// A complete declarative description of a service: what pods exist, what
/// tasks they run, and what resources those tasks need.
///
/// Immutable per generation. Submitting a modified specification produces a
/// new config target; it never mutates a stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpecification {
    /// Service name; doubles as the framework name at registration.
    pub name: String,

    /// Principal reservations are made under.
    pub principal: String,

    /// Role resources are reserved for.
    pub role: String,

    /// Ordered pod list. Deployment rolls through pods in this order.
    pub pods: Vec<PodSpec>,
}

impl ServiceSpecification {
    /// Iterate all task specs across all pods, paired with their pod instance.
    pub fn tasks(&self) -> impl Iterator<Item = (PodInstance, &TaskSpec)> {
        self.pods
            .iter()
            .flat_map(|pod| pod.tasks.iter().map(move |task| (pod.instance(), task)))
    }

    /// Find the task spec with the given name, if any.
    pub fn task(&self, name: &str) -> Option<(PodInstance, &TaskSpec)> {
        self.tasks().find(|(_, t)| t.name == name)
    }
}

/// A co-scheduled group of tasks, identified by `(type, index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Pod type, e.g. `"broker"`.
    #[serde(rename = "type")]
    pub pod_type: String,

    /// Unix user tasks run as; defaults to the framework user when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Index of this pod within its type.
    pub index: u32,

    /// Tasks launched together from one offer.
    pub tasks: Vec<TaskSpec>,

    /// Named resource sets tasks may reference instead of inline resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_sets: Vec<ResourceSet>,

    /// Placement constraint applied to every task in the pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementRule>,
}

impl PodSpec {
    /// The `(type, index)` identity of this pod.
    #[must_use]
    pub fn instance(&self) -> PodInstance {
        PodInstance {
            pod_type: self.pod_type.clone(),
            index: self.index,
        }
    }
}

/// Identity of one pod: `(type, index)`.
///
/// This is the unit of dirty-asset exclusion during offer dispatch: no two
/// steps targeting the same pod instance may act within one offer cycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodInstance {
    #[serde(rename = "type")]
    pub pod_type: String,
    pub index: u32,
}

impl PodInstance {
    #[must_use]
    pub fn new(pod_type: impl Into<String>, index: u32) -> Self {
        Self {
            pod_type: pod_type.into(),
            index,
        }
    }
}

impl std::fmt::Display for PodInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.pod_type, self.index)
    }
}

/// A named, reusable bundle of resources and volumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub id: String,
    pub resources: Vec<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
}

/// One task within a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, unique across the whole specification.
    pub name: String,

    /// Shell command the executor runs.
    pub command: String,

    /// Goal state: what terminal-or-running status means "deployed".
    #[serde(default)]
    pub goal: GoalState,

    /// Resource requirements (cpus, mem, ports, ...).
    pub resources: Vec<ResourceSpec>,

    /// Persistent volume requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,

    /// Task-level placement constraint, checked in addition to the pod's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementRule>,

    /// Optional health check run by the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

/// The run state at which a task counts as successfully deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    /// Long-running service task: deployed once RUNNING.
    #[default]
    Running,
    /// One-shot task: deployed once FINISHED.
    Finished,
}

/// A single resource requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource name as offered by the cluster (`cpus`, `mem`, `ports`, ...).
    pub name: String,

    /// Required amount.
    pub value: ResourceValue,
}

impl ResourceSpec {
    /// Convenience constructor for scalar resources.
    #[must_use]
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(value),
        }
    }

    /// Convenience constructor for range resources such as ports.
    #[must_use]
    pub fn ranges(name: impl Into<String>, ranges: Vec<PortRange>) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Ranges(ranges),
        }
    }
}

/// Resource amount: scalar (cpus, mem in MB) or ranges (ports).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<PortRange>),
}

/// An inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub begin: u64,
    pub end: u64,
}

impl PortRange {
    #[must_use]
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Number of ports covered by the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.begin) + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.begin
    }
}

/// A persistent volume requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Path inside the container where the volume is mounted.
    pub container_path: String,

    /// Requested size in megabytes.
    pub size_mb: u64,
}

/// An executor-run health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Shell command; exit 0 is healthy.
    pub command: String,

    /// Seconds between checks.
    pub interval_secs: u32,

    /// Seconds before an individual check is considered hung.
    pub timeout_secs: u32,

    /// Consecutive failures before the task is reported unhealthy.
    pub max_failures: u32,

    /// Seconds to wait after launch before the first check.
    pub delay_secs: u32,
}

/// Per-pod-type task counts, used by validation.
pub(crate) fn task_counts(spec: &ServiceSpecification) -> BTreeMap<&str, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for pod in &spec.pods {
        *counts.entry(pod.pod_type.as_str()).or_default() += pod.tasks.len();
    }
    counts
}
