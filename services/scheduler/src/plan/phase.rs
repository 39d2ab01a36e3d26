//! Phases: ordered step containers.

use std::sync::Arc;

use armada_id::PhaseId;

use super::step::Step;
use super::strategy::Strategy;
use super::{join, Status};

/// An ordered list of steps governed by a strategy.
pub struct Phase {
    id: PhaseId,
    name: String,
    steps: Vec<Arc<dyn Step>>,
    strategy: Arc<dyn Strategy>,
}

impl Phase {
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Step>>, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            id: PhaseId::new(),
            name: name.into(),
            steps,
            strategy,
        }
    }

    #[must_use]
    pub fn id(&self) -> PhaseId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    /// Append a step; used while assembling a plan.
    pub(crate) fn push_step(&mut self, step: Arc<dyn Step>) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// Derived status of the phase under its strategy.
    #[must_use]
    pub fn status(&self) -> Status {
        let statuses: Vec<Status> = self.steps.iter().map(|s| s.status()).collect();
        join(&statuses, self.strategy.is_interrupted())
    }

    /// Steps currently eligible for work, in child order.
    #[must_use]
    pub fn candidates(&self) -> Vec<Arc<dyn Step>> {
        let statuses: Vec<Status> = self.steps.iter().map(|s| s.status()).collect();
        self.strategy
            .candidates(&statuses)
            .into_iter()
            .filter_map(|idx| self.steps.get(idx).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use armada_spec::ConfigTarget;
    use armada_spec::{GoalState, PodSpec, ResourceSpec, TaskSpec};

    use super::super::step::DeploymentStep;
    use super::super::strategy::SerialStrategy;
    use super::*;
    use crate::state::InMemoryStateStore;

    fn step(index: u32) -> Arc<dyn Step> {
        Arc::new(DeploymentStep::new(
            PodSpec {
                pod_type: "node".to_string(),
                user: None,
                index,
                tasks: vec![TaskSpec {
                    name: format!("node-{index}-server"),
                    command: "./run".to_string(),
                    goal: GoalState::Running,
                    resources: vec![ResourceSpec::scalar("cpus", 1.0)],
                    volumes: vec![],
                    placement: None,
                    health_check: None,
                }],
                resource_sets: vec![],
                placement: None,
            },
            "role",
            "principal",
            ConfigTarget::from_raw("sha256:test"),
            Arc::new(InMemoryStateStore::new()),
        ))
    }

    #[test]
    fn test_serial_phase_yields_first_step() {
        let phase = Phase::new(
            "node",
            vec![step(0), step(1)],
            Arc::new(SerialStrategy::new()),
        );
        assert_eq!(phase.status(), Status::Pending);

        let candidates = phase.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "node-0");
    }

    #[test]
    fn test_interrupt_empties_candidates_and_derives_waiting() {
        let phase = Phase::new("node", vec![step(0)], Arc::new(SerialStrategy::new()));
        phase.strategy().interrupt();
        assert!(phase.candidates().is_empty());
        assert_eq!(phase.status(), Status::Waiting);
    }
}
