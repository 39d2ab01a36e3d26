//! Plan managers.
//!
//! A plan manager owns exactly one plan: it reports candidate steps for
//! offer dispatch, routes task statuses into the plan, and exposes the
//! operator controls (interrupt, proceed, restart, force-complete).

use std::collections::BTreeSet;
use std::sync::Arc;

use armada_id::{PhaseId, StepId};
use armada_spec::PodInstance;
use serde::Serialize;
use thiserror::Error;

use crate::task::TaskStatus;

use super::plan::Plan;
use super::step::Step;
use super::strategy::Strategy;
use super::Status;

/// Errors from operator plan controls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("unknown phase: {0}")]
    UnknownPhase(PhaseId),

    #[error("unknown step: {0}")]
    UnknownStep(StepId),
}

/// Owns one plan and mediates all access to it.
pub trait PlanManager: Send + Sync {
    /// Plan name, unique among the coordinator's managers.
    fn name(&self) -> &str;

    /// The plan's derived status.
    fn status(&self) -> Status;

    /// Candidate steps in plan order, excluding steps whose pod instance is
    /// already being acted on by an earlier manager this cycle.
    fn candidates(&self, dirty: &BTreeSet<PodInstance>) -> Vec<Arc<dyn Step>>;

    /// Route a task status into the plan.
    fn update(&self, status: &TaskStatus);

    fn interrupt(&self);
    fn proceed(&self);
    fn is_interrupted(&self) -> bool;

    fn restart(&self, phase_id: PhaseId, step_id: StepId) -> Result<(), PlanError>;
    fn force_complete(&self, phase_id: PhaseId, step_id: StepId) -> Result<(), PlanError>;

    /// Snapshot for the operator surface.
    fn report(&self) -> PlanReport;
}

/// Manager for the deployment plan (or any statically-built plan).
pub struct DeploymentPlanManager {
    plan: Plan,
}

impl DeploymentPlanManager {
    #[must_use]
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }

    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }
}

impl PlanManager for DeploymentPlanManager {
    fn name(&self) -> &str {
        self.plan.name()
    }

    fn status(&self) -> Status {
        self.plan.status()
    }

    fn candidates(&self, dirty: &BTreeSet<PodInstance>) -> Vec<Arc<dyn Step>> {
        candidates_of(&self.plan, dirty)
    }

    fn update(&self, status: &TaskStatus) {
        for phase in self.plan.phases() {
            for step in phase.steps() {
                step.update(status);
            }
        }
    }

    fn interrupt(&self) {
        self.plan.strategy().interrupt();
    }

    fn proceed(&self) {
        self.plan.strategy().proceed();
    }

    fn is_interrupted(&self) -> bool {
        self.plan.strategy().is_interrupted()
    }

    fn restart(&self, phase_id: PhaseId, step_id: StepId) -> Result<(), PlanError> {
        find_step(&self.plan, phase_id, step_id)?.restart();
        Ok(())
    }

    fn force_complete(&self, phase_id: PhaseId, step_id: StepId) -> Result<(), PlanError> {
        find_step(&self.plan, phase_id, step_id)?.force_complete();
        Ok(())
    }

    fn report(&self) -> PlanReport {
        report_of(&self.plan)
    }
}

/// Ordered candidate steps of a plan, minus dirty assets.
pub(crate) fn candidates_of(plan: &Plan, dirty: &BTreeSet<PodInstance>) -> Vec<Arc<dyn Step>> {
    plan.candidate_phases()
        .into_iter()
        .flat_map(|phase| phase.candidates())
        .filter(|step| match step.asset() {
            Some(asset) => !dirty.contains(&asset),
            None => true,
        })
        .collect()
}

pub(crate) fn find_step(
    plan: &Plan,
    phase_id: PhaseId,
    step_id: StepId,
) -> Result<Arc<dyn Step>, PlanError> {
    let phase = plan
        .phases()
        .iter()
        .find(|p| p.id() == phase_id)
        .ok_or(PlanError::UnknownPhase(phase_id))?;
    phase
        .steps()
        .iter()
        .find(|s| s.id() == step_id)
        .cloned()
        .ok_or(PlanError::UnknownStep(step_id))
}

pub(crate) fn report_of(plan: &Plan) -> PlanReport {
    PlanReport {
        name: plan.name().to_string(),
        status: plan.status(),
        interrupted: plan.strategy().is_interrupted(),
        phases: plan
            .phases()
            .iter()
            .map(|phase| PhaseReport {
                id: phase.id(),
                name: phase.name().to_string(),
                status: phase.status(),
                interrupted: phase.strategy().is_interrupted(),
                steps: phase
                    .steps()
                    .iter()
                    .map(|step| StepReport {
                        id: step.id(),
                        name: step.name().to_string(),
                        status: step.status(),
                        message: step.message(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Operator-facing snapshot of a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub name: String,
    pub status: Status,
    pub interrupted: bool,
    pub phases: Vec<PhaseReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub id: PhaseId,
    pub name: String,
    pub status: Status,
    pub interrupted: bool,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: StepId,
    pub name: String,
    pub status: Status,
    pub message: Option<String>,
}

impl PlanReport {
    /// Find a (phase, step) pair by step name, for operator tooling.
    #[must_use]
    pub fn find_step(&self, step_name: &str) -> Option<(PhaseId, StepId)> {
        for phase in &self.phases {
            for step in &phase.steps {
                if step.name == step_name {
                    return Some((phase.id, step.id));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use armada_spec::{ConfigTarget, GoalState, PodSpec, ResourceSpec, ServiceSpecification, TaskSpec};

    use super::*;
    use crate::state::{InMemoryStateStore, StateStore};

    fn manager() -> DeploymentPlanManager {
        let task = |name: &str| TaskSpec {
            name: name.to_string(),
            command: "./run".to_string(),
            goal: GoalState::Running,
            resources: vec![ResourceSpec::scalar("cpus", 1.0)],
            volumes: vec![],
            placement: None,
            health_check: None,
        };
        let spec = ServiceSpecification {
            name: "svc".to_string(),
            principal: "p".to_string(),
            role: "r".to_string(),
            pods: vec![
                PodSpec {
                    pod_type: "node".to_string(),
                    user: None,
                    index: 0,
                    tasks: vec![task("node-0-server")],
                    resource_sets: vec![],
                    placement: None,
                },
                PodSpec {
                    pod_type: "node".to_string(),
                    user: None,
                    index: 1,
                    tasks: vec![task("node-1-server")],
                    resource_sets: vec![],
                    placement: None,
                },
            ],
        };
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        DeploymentPlanManager::new(Plan::deployment(
            &spec,
            &ConfigTarget::from_raw("sha256:test"),
            &store,
        ))
    }

    #[test]
    fn test_candidates_respect_dirty_assets() {
        let manager = manager();
        let candidates = manager.candidates(&BTreeSet::new());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "node-0");

        let mut dirty = BTreeSet::new();
        dirty.insert(PodInstance::new("node", 0));
        assert!(manager.candidates(&dirty).is_empty());
    }

    #[test]
    fn test_interrupt_roundtrip() {
        let manager = manager();
        assert!(!manager.is_interrupted());
        manager.interrupt();
        assert!(manager.is_interrupted());
        assert_eq!(manager.status(), Status::Waiting);
        assert!(manager.candidates(&BTreeSet::new()).is_empty());
        manager.proceed();
        assert!(!manager.is_interrupted());
    }

    #[test]
    fn test_force_complete_through_report_ids() {
        let manager = manager();
        let report = manager.report();
        let (phase_id, step_id) = report.find_step("node-0").unwrap();
        manager.force_complete(phase_id, step_id).unwrap();

        let report = manager.report();
        assert_eq!(report.phases[0].steps[0].status, Status::Complete);
    }

    #[test]
    fn test_unknown_ids_rejected() {
        let manager = manager();
        let err = manager.restart(PhaseId::new(), StepId::new()).unwrap_err();
        assert!(matches!(err, PlanError::UnknownPhase(_)));
    }
}
