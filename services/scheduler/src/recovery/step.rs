//! Recovery steps.
//!
//! One step per failed task. A transient step relaunches the task in place,
//! reusing whatever reservations survive on the agent; a permanent step
//! first tears the old reservations down and re-reserves from scratch.
//! Permanent launches are additionally gated by the shared launch
//! constrainer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use armada_id::{StepId, TaskId};
use armada_spec::{ConfigTarget, PodInstance, TaskSpec};
use tracing::{debug, info};

use crate::offer::requirement::{OfferRequirement, TaskRequirement};
use crate::offer::Resource;
use crate::plan::step::Step;
use crate::plan::Status;
use crate::task::TaskStatus;

use super::constrain::{RecoveryKind, TimedLaunchConstrainer};

#[derive(Debug)]
struct RecoveryStepState {
    status: Status,
    task_id: Option<TaskId>,
}

pub struct RecoveryStep {
    id: StepId,
    name: String,
    pod: PodInstance,
    kind: RecoveryKind,
    task: TaskSpec,
    target: ConfigTarget,
    role: String,
    principal: String,

    /// Concrete reserved resources of the failed launch, torn down by a
    /// permanent recovery.
    stale_resources: Vec<Resource>,

    constrainer: Arc<TimedLaunchConstrainer>,
    state: Mutex<RecoveryStepState>,
}

impl RecoveryStep {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        pod: PodInstance,
        kind: RecoveryKind,
        task: TaskSpec,
        target: ConfigTarget,
        role: impl Into<String>,
        principal: impl Into<String>,
        stale_resources: Vec<Resource>,
        constrainer: Arc<TimedLaunchConstrainer>,
    ) -> Self {
        Self {
            id: StepId::new(),
            name: task.name.clone(),
            pod,
            kind,
            task,
            target,
            role: role.into(),
            principal: principal.into(),
            stale_resources,
            constrainer,
            state: Mutex::new(RecoveryStepState {
                status: Status::Pending,
                task_id: None,
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> RecoveryKind {
        self.kind
    }

    /// The failed task's name; recovery steps are keyed by it when a plan is
    /// regenerated.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task.name
    }

    fn lock(&self) -> MutexGuard<'_, RecoveryStepState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Step for RecoveryStep {
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
        Some(self.pod.clone())
    }

    fn start(&self) -> Option<OfferRequirement> {
        let mut state = self.lock();
        if state.status != Status::Pending {
            return None;
        }
        if !self.constrainer.can_launch(self.kind) {
            debug!(task = %self.name, "Destructive recovery rate limit in effect");
            return None;
        }

        let task_id = TaskId::new(&self.task.name);
        state.task_id = Some(task_id.clone());
        state.status = Status::Prepared;
        info!(task = %self.name, kind = ?self.kind, "Recovery step prepared");

        let teardown = match self.kind {
            RecoveryKind::Transient => Vec::new(),
            RecoveryKind::Permanent => self
                .stale_resources
                .iter()
                .filter(|r| r.reservation.is_some())
                .cloned()
                .collect(),
        };

        Some(OfferRequirement {
            pod: self.pod.clone(),
            config_target: self.target.clone(),
            role: self.role.clone(),
            principal: self.principal.clone(),
            placement: self.task.placement.clone(),
            tasks: vec![TaskRequirement {
                task_id,
                name: self.task.name.clone(),
                command: self.task.command.clone(),
                resources: self.task.resources.clone(),
                volumes: self.task.volumes.clone(),
                placement: None,
                health_check: self.task.health_check.clone(),
            }],
            teardown,
            kill_first: Vec::new(),
        })
    }

    fn update_offer_status(&self, launched: Option<BTreeSet<TaskId>>) {
        let mut state = self.lock();
        match launched {
            Some(ids) if !ids.is_empty() => {
                if state.status == Status::Prepared {
                    state.status = Status::Starting;
                    self.constrainer.launch_happened(self.kind);
                    info!(task = %self.name, "Recovery launch dispatched");
                }
            }
            _ => {
                if state.status == Status::Prepared {
                    state.status = Status::Pending;
                    state.task_id = None;
                }
            }
        }
    }

    fn update(&self, status: &TaskStatus) {
        let mut state = self.lock();
        if state.task_id.as_ref() != Some(&status.task_id) {
            return;
        }
        if status.state.reached_goal(self.task.goal) {
            if state.status != Status::Complete {
                info!(task = %self.name, "Recovery complete");
                state.status = Status::Complete;
            }
        } else if status.state.needs_recovery(self.task.goal) && state.status == Status::Starting {
            info!(task = %self.name, state = %status.state, "Recovery launch failed; retrying");
            state.status = Status::Pending;
            state.task_id = None;
        }
    }

    fn restart(&self) {
        let mut state = self.lock();
        state.status = Status::Pending;
        state.task_id = None;
    }

    fn force_complete(&self) {
        self.lock().status = Status::Complete;
    }
}

/// Index in-flight steps by task name for plan regeneration.
pub(crate) fn by_task_name(steps: &[Arc<RecoveryStep>]) -> BTreeMap<String, Arc<RecoveryStep>> {
    steps
        .iter()
        .map(|s| (s.task_name().to_string(), s.clone()))
        .collect()
}
