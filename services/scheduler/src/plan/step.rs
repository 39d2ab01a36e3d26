//! Steps: the smallest unit of plan work.
//!
//! A step owns a lifecycle state machine:
//!
//! ```text
//! PENDING -> PREPARED -> STARTING -> COMPLETE
//!    ^          |            |
//!    +----------+------------+   (no accepted offers / reset trigger)
//! ```
//!
//! Any state may enter ERROR on a validation failure. COMPLETE returns to
//! PENDING when the step's config target changes. Only a PENDING step may be
//! started, and STARTING always carries a non-empty task-id set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use armada_id::{StepId, TaskId};
use armada_spec::{ConfigTarget, PodInstance, PodSpec};
use tracing::{debug, info, warn};

use crate::offer::requirement::{OfferRequirement, TaskRequirement};
use crate::state::StateStore;
use crate::task::TaskStatus;

use super::Status;

/// The unit of schedulable work.
pub trait Step: Send + Sync {
    fn id(&self) -> StepId;
    fn name(&self) -> &str;
    fn status(&self) -> Status;

    /// The pod instance this step acts on, for dirty-asset exclusion.
    fn asset(&self) -> Option<PodInstance>;

    /// Begin work: transition PENDING -> PREPARED and return the offer
    /// requirement, or `None` when there is nothing to do. Called at most
    /// once per PENDING -> PREPARED transition.
    fn start(&self) -> Option<OfferRequirement>;

    /// Report the outcome of offer dispatch. A non-empty launched set moves
    /// PREPARED -> STARTING; otherwise the step returns to PENDING so the
    /// next cycle retries.
    fn update_offer_status(&self, launched: Option<BTreeSet<TaskId>>);

    /// Route a task status update into the step. Unknown task IDs are
    /// ignored.
    fn update(&self, status: &TaskStatus);

    /// Admin: rerun this step from PENDING.
    fn restart(&self);

    /// Admin: declare this step done without running it.
    fn force_complete(&self);

    /// Human-readable detail, e.g. the validation error.
    fn message(&self) -> Option<String> {
        None
    }
}

/// Mutable step state, guarded by one mutex per step.
#[derive(Debug)]
struct StepState {
    status: Status,
    /// Latest launch ID per task name, adopted from the state store at build
    /// time and replaced on every `start()`.
    task_ids: BTreeMap<String, TaskId>,
    /// Task names that reached their goal state at the current target.
    reached: BTreeSet<String>,
    message: Option<String>,
}

/// A deployment step: launch (or relaunch) all tasks of one pod at the
/// current config target.
pub struct DeploymentStep {
    id: StepId,
    name: String,
    pod: PodSpec,
    instance: PodInstance,
    target: ConfigTarget,
    role: String,
    principal: String,
    state_store: Arc<dyn StateStore>,
    state: Mutex<StepState>,
}

impl DeploymentStep {
    /// Build a step for one pod, adopting any previously-launched tasks from
    /// the state store: a pod already running at the current target starts
    /// out COMPLETE.
    pub fn new(
        pod: PodSpec,
        role: impl Into<String>,
        principal: impl Into<String>,
        target: ConfigTarget,
        state_store: Arc<dyn StateStore>,
    ) -> Self {
        let instance = pod.instance();
        let name = instance.to_string();
        let id = StepId::new();

        if let Some(message) = validate_pod(&pod) {
            warn!(step = %name, error = %message, "Pod failed validation");
            return Self {
                id,
                name,
                pod,
                instance,
                target,
                role: role.into(),
                principal: principal.into(),
                state_store,
                state: Mutex::new(StepState {
                    status: Status::Error,
                    task_ids: BTreeMap::new(),
                    reached: BTreeSet::new(),
                    message: Some(message),
                }),
            };
        }

        let mut task_ids = BTreeMap::new();
        let mut reached = BTreeSet::new();
        for task in &pod.tasks {
            if let Ok(Some(record)) = state_store.fetch_task(&task.name) {
                let deployed = record.info.config_target == target
                    && record
                        .status
                        .as_ref()
                        .is_some_and(|s| s.state.reached_goal(task.goal));
                task_ids.insert(task.name.clone(), record.info.task_id.clone());
                if deployed {
                    reached.insert(task.name.clone());
                }
            }
        }

        let status = if !pod.tasks.is_empty() && reached.len() == pod.tasks.len() {
            Status::Complete
        } else {
            Status::Pending
        };

        Self {
            id,
            name,
            pod,
            instance,
            target,
            role: role.into(),
            principal: principal.into(),
            state_store,
            state: Mutex::new(StepState {
                status,
                task_ids,
                reached,
                message: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StepState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Step for DeploymentStep {
    fn id(&self) -> StepId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        self.lock().status
    }

    fn asset(&self) -> Option<PodInstance> {
        Some(self.instance.clone())
    }

    fn start(&self) -> Option<OfferRequirement> {
        let mut state = self.lock();
        if state.status != Status::Pending {
            return None;
        }

        // A previous launch that is still alive (stale config, or a stuck
        // deploy) must be killed before its replacement goes out.
        let mut kill_first: Vec<TaskId> = Vec::new();
        for task in &self.pod.tasks {
            if let Ok(Some(record)) = self.state_store.fetch_task(&task.name) {
                if record
                    .status
                    .as_ref()
                    .is_some_and(|s| !s.state.is_terminal())
                {
                    kill_first.push(record.info.task_id.clone());
                }
            }
        }

        let mut tasks = Vec::with_capacity(self.pod.tasks.len());
        for task in &self.pod.tasks {
            let task_id = TaskId::new(&task.name);
            state.task_ids.insert(task.name.clone(), task_id.clone());
            tasks.push(TaskRequirement {
                task_id,
                name: task.name.clone(),
                command: task.command.clone(),
                resources: task.resources.clone(),
                volumes: task.volumes.clone(),
                placement: task.placement.clone(),
                health_check: task.health_check.clone(),
            });
        }

        state.reached.clear();
        state.status = Status::Prepared;
        debug!(step = %self.name, "Step prepared");

        Some(OfferRequirement {
            pod: self.instance.clone(),
            config_target: self.target.clone(),
            role: self.role.clone(),
            principal: self.principal.clone(),
            placement: self.pod.placement.clone(),
            tasks,
            teardown: Vec::new(),
            kill_first,
        })
    }

    fn update_offer_status(&self, launched: Option<BTreeSet<TaskId>>) {
        let mut state = self.lock();
        match launched {
            Some(ids) if !ids.is_empty() => {
                if state.status == Status::Prepared {
                    state.status = Status::Starting;
                    info!(step = %self.name, launches = ids.len(), "Step starting");
                }
            }
            _ => {
                // No launches went out; retry from PENDING next cycle.
                if state.status == Status::Prepared {
                    state.status = Status::Pending;
                }
            }
        }
    }

    fn update(&self, status: &TaskStatus) {
        let mut state = self.lock();
        if state.status == Status::Error {
            return;
        }

        let name = status.task_id.task_name();
        let Some(task) = self.pod.tasks.iter().find(|t| t.name == name) else {
            return;
        };
        // Only the launch we know about may drive the state machine; statuses
        // for superseded launches are stale.
        if state.task_ids.get(name) != Some(&status.task_id) {
            return;
        }

        // A live task reporting a different config generation needs a
        // rolling redeploy.
        if status
            .config_target
            .as_ref()
            .is_some_and(|t| *t != self.target)
        {
            if state.status != Status::Pending {
                info!(step = %self.name, task = name, "Task is on an outdated config; resetting");
                state.status = Status::Pending;
                state.reached.clear();
            }
            return;
        }

        if status.state.reached_goal(task.goal) {
            state.reached.insert(name.to_string());
            if state.reached.len() == self.pod.tasks.len()
                && matches!(state.status, Status::Starting | Status::Pending | Status::Prepared)
            {
                info!(step = %self.name, "Step complete");
                state.status = Status::Complete;
            }
        } else if status.state.needs_recovery(task.goal) && state.status == Status::Starting {
            // The launch died before the pod finished deploying; retry.
            // Failures after COMPLETE are recovery's business, not ours.
            info!(step = %self.name, task = name, state = %status.state, "Launch failed; resetting");
            state.reached.remove(name);
            state.status = Status::Pending;
        }
    }

    fn restart(&self) {
        let mut state = self.lock();
        state.status = Status::Pending;
        state.reached.clear();
    }

    fn force_complete(&self) {
        self.lock().status = Status::Complete;
    }

    fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }
}

/// Structural validation of a pod spec; a violation puts the step in ERROR.
fn validate_pod(pod: &PodSpec) -> Option<String> {
    if pod.tasks.is_empty() {
        return Some(format!("pod {} declares no tasks", pod.instance()));
    }
    for task in &pod.tasks {
        if task.resources.is_empty() {
            return Some(format!("task {} declares no resources", task.name));
        }
        if let Some(volume) = task.volumes.iter().find(|v| v.size_mb == 0) {
            return Some(format!(
                "task {} volume {} has zero size",
                task.name, volume.container_path
            ));
        }
    }
    let mut seen = BTreeSet::new();
    for task in &pod.tasks {
        if !seen.insert(task.name.as_str()) {
            return Some(format!("duplicate task name {}", task.name));
        }
    }
    None
}
