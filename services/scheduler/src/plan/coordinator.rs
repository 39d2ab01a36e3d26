//! The plan coordinator.
//!
//! Multiplexes an offer batch across plan managers in declared order:
//! deployment first, recovery second. Within one cycle a pod instance
//! touched by an earlier manager is dirty for later ones, so no two steps
//! act on the same pod concurrently. The coordinator owns the change
//! notification channel; the engine subscribes and suppresses or revives
//! offers accordingly.

use std::collections::BTreeSet;
use std::sync::Arc;

use armada_id::OfferId;
use armada_spec::PodInstance;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::driver::SchedulerDriver;
use crate::offer::Offer;
use crate::task::TaskStatus;

use super::manager::{PlanManager, PlanReport};
use super::scheduler::PlanScheduler;
use super::Status;

/// Snapshot published to subscribers whenever any plan's status changes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinatorState {
    /// (plan name, derived status) per manager, in priority order.
    pub plans: Vec<(String, Status)>,

    /// Whether any plan still has work that needs offers.
    pub has_operations: bool,
}

pub struct PlanCoordinator {
    managers: Vec<Arc<dyn PlanManager>>,
    scheduler: PlanScheduler,
    notify: watch::Sender<CoordinatorState>,
}

impl PlanCoordinator {
    /// Build a coordinator over managers in priority order.
    #[must_use]
    pub fn new(managers: Vec<Arc<dyn PlanManager>>, scheduler: PlanScheduler) -> Self {
        let (notify, _) = watch::channel(CoordinatorState::default());
        let coordinator = Self {
            managers,
            scheduler,
            notify,
        };
        coordinator.publish();
        coordinator
    }

    /// Dispatch an offer batch. Returns the accepted offer IDs, always a
    /// subset of the batch.
    pub fn process_offers(&self, driver: &dyn SchedulerDriver, offers: &[Offer]) -> Vec<OfferId> {
        let mut accepted: Vec<OfferId> = Vec::new();
        let mut dirty: BTreeSet<PodInstance> = BTreeSet::new();
        let mut remaining: Vec<Offer> = offers.to_vec();

        for manager in &self.managers {
            let candidates = manager.candidates(&dirty);
            debug!(
                plan = manager.name(),
                candidates = candidates.len(),
                offers = remaining.len(),
                "Dispatching offers to plan"
            );

            for step in candidates {
                let step_accepted = self.scheduler.resource_offers(driver, &remaining, step.as_ref());

                // The pod is dirty for later managers whether or not offers
                // were accepted: this step owns it for the rest of the cycle.
                if let Some(asset) = step.asset() {
                    dirty.insert(asset);
                }

                if !step_accepted.is_empty() {
                    remaining.retain(|o| !step_accepted.contains(&o.id));
                    accepted.extend(step_accepted);
                }
            }
        }

        if !accepted.is_empty() {
            info!(accepted = accepted.len(), total = offers.len(), "Offer cycle complete");
        }
        self.publish();
        accepted
    }

    /// Route a task status to every plan, then publish any status change.
    pub fn update(&self, status: &TaskStatus) {
        for manager in &self.managers {
            manager.update(status);
        }
        self.publish();
    }

    /// Whether any plan still wants offers. Interrupted (WAITING) plans do
    /// not count: offers would go unused anyway.
    #[must_use]
    pub fn has_operations(&self) -> bool {
        self.managers
            .iter()
            .any(|m| !matches!(m.status(), Status::Complete | Status::Waiting))
    }

    /// Subscribe to status-change notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.notify.subscribe()
    }

    /// The managers, in priority order, for the operator surface.
    #[must_use]
    pub fn managers(&self) -> &[Arc<dyn PlanManager>] {
        &self.managers
    }

    #[must_use]
    pub fn manager(&self, name: &str) -> Option<&Arc<dyn PlanManager>> {
        self.managers.iter().find(|m| m.name() == name)
    }

    /// Operator snapshots of every plan.
    #[must_use]
    pub fn reports(&self) -> Vec<PlanReport> {
        self.managers.iter().map(|m| m.report()).collect()
    }

    /// Publish the current state if it changed since the last publication.
    pub fn publish(&self) {
        let state = CoordinatorState {
            plans: self
                .managers
                .iter()
                .map(|m| (m.name().to_string(), m.status()))
                .collect(),
            has_operations: self.has_operations(),
        };
        self.notify.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use armada_spec::{ConfigTarget, GoalState, PodSpec, ResourceSpec, ServiceSpecification, TaskSpec};

    use super::super::manager::DeploymentPlanManager;
    use super::super::plan::Plan;
    use super::*;
    use crate::driver::LoggingDriver;
    use crate::kill::TaskKiller;
    use crate::offer::accepter::OfferAccepter;
    use crate::offer::evaluator::OfferEvaluator;
    use crate::offer::Resource;
    use crate::state::{InMemoryStateStore, StateStore};

    fn one_pod_spec() -> ServiceSpecification {
        ServiceSpecification {
            name: "svc".to_string(),
            principal: "p".to_string(),
            role: "r".to_string(),
            pods: vec![PodSpec {
                pod_type: "node".to_string(),
                user: None,
                index: 0,
                tasks: vec![TaskSpec {
                    name: "node-0-server".to_string(),
                    command: "./run".to_string(),
                    goal: GoalState::Running,
                    resources: vec![ResourceSpec::scalar("cpus", 1.0)],
                    volumes: vec![],
                    placement: None,
                    health_check: None,
                }],
                resource_sets: vec![],
                placement: None,
            }],
        }
    }

    fn coordinator(store: Arc<InMemoryStateStore>) -> PlanCoordinator {
        let state_store: Arc<dyn StateStore> = store.clone();
        let plan = Plan::deployment(
            &one_pod_spec(),
            &ConfigTarget::from_raw("sha256:test"),
            &state_store,
        );
        PlanCoordinator::new(
            vec![Arc::new(DeploymentPlanManager::new(plan))],
            PlanScheduler::new(
                OfferEvaluator::new(),
                OfferAccepter::new(vec![]),
                TaskKiller::new(store),
            ),
        )
    }

    fn offer(id: &str, cpus: f64) -> Offer {
        Offer {
            id: OfferId::parse(id).unwrap(),
            agent_id: armada_id::AgentId::parse("agent-1").unwrap(),
            hostname: "host-1".to_string(),
            attributes: Default::default(),
            resources: vec![Resource::scalar("cpus", cpus)],
        }
    }

    #[test]
    fn test_accepted_is_subset_of_batch() {
        let store = Arc::new(InMemoryStateStore::new());
        let coordinator = coordinator(store);
        let offers = vec![offer("o1", 4.0), offer("o2", 4.0)];
        let accepted = coordinator.process_offers(&LoggingDriver, &offers);
        assert_eq!(accepted.len(), 1);
        assert!(offers.iter().any(|o| o.id == accepted[0]));
    }

    #[test]
    fn test_has_operations_and_notification() {
        let store = Arc::new(InMemoryStateStore::new());
        let coordinator = coordinator(store);
        let mut rx = coordinator.subscribe();
        assert!(coordinator.has_operations());
        assert!(rx.borrow_and_update().has_operations);

        coordinator.process_offers(&LoggingDriver, &[offer("o1", 4.0)]);
        // The plan moved Pending -> InProgress; subscribers see the change.
        assert!(rx.has_changed().unwrap());
    }
}
