//! Plans: top-level phase containers, plus the deployment plan builder.

use std::sync::Arc;

use armada_id::PlanId;
use armada_spec::{ConfigTarget, ServiceSpecification};

use crate::state::StateStore;

use super::phase::Phase;
use super::step::DeploymentStep;
use super::strategy::{SerialStrategy, Strategy};
use super::{join, Status};

/// An ordered list of phases governed by a strategy.
pub struct Plan {
    id: PlanId,
    name: String,
    phases: Vec<Phase>,
    strategy: Arc<dyn Strategy>,
}

impl Plan {
    #[must_use]
    pub fn new(name: impl Into<String>, phases: Vec<Phase>, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            id: PlanId::new(),
            name: name.into(),
            phases,
            strategy,
        }
    }

    /// Build the deployment plan for a specification: one phase per pod
    /// type, one step per pod, everything serial. Pods already running at
    /// the target come out COMPLETE, which is what makes deployment
    /// idempotent across scheduler restarts.
    pub fn deployment(
        spec: &ServiceSpecification,
        target: &ConfigTarget,
        state_store: &Arc<dyn StateStore>,
    ) -> Self {
        let mut phases: Vec<Phase> = Vec::new();
        for pod in &spec.pods {
            let step = Arc::new(DeploymentStep::new(
                pod.clone(),
                spec.role.clone(),
                spec.principal.clone(),
                target.clone(),
                state_store.clone(),
            ));

            match phases.iter_mut().find(|p| p.name() == pod.pod_type) {
                Some(phase) => phase.push_step(step),
                None => phases.push(Phase::new(
                    pod.pod_type.clone(),
                    vec![step],
                    Arc::new(SerialStrategy::new()),
                )),
            }
        }

        Self::new("deploy", phases, Arc::new(SerialStrategy::new()))
    }

    #[must_use]
    pub fn id(&self) -> PlanId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// Derived status of the whole plan.
    #[must_use]
    pub fn status(&self) -> Status {
        let statuses: Vec<Status> = self.phases.iter().map(|p| p.status()).collect();
        join(&statuses, self.strategy.is_interrupted())
    }

    /// Candidate phases under the plan strategy, each yielding its own
    /// candidate steps.
    #[must_use]
    pub fn candidate_phases(&self) -> Vec<&Phase> {
        let statuses: Vec<Status> = self.phases.iter().map(|p| p.status()).collect();
        self.strategy
            .candidates(&statuses)
            .into_iter()
            .filter_map(|idx| self.phases.get(idx))
            .collect()
    }
}
