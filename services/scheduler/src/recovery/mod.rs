//! Failure recovery.
//!
//! The recovery plan manager watches the state store for tasks that are not
//! in a healthy run state and synthesizes a recovery plan from them: one
//! step per failed task, transient or permanent. The plan is regenerated
//! whenever the set of failing tasks changes; in-flight steps are preserved
//! across regenerations.

pub mod constrain;
pub mod monitor;
pub mod step;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use armada_id::{PhaseId, StepId};
use armada_spec::PodInstance;
use tracing::{debug, warn};

use crate::plan::manager::{candidates_of, find_step, report_of, PlanError, PlanManager, PlanReport};
use crate::plan::phase::Phase;
use crate::plan::plan::Plan;
use crate::plan::step::Step;
use crate::plan::strategy::{ParallelWithErrorsStrategy, SerialStrategy, Strategy};
use crate::plan::Status;
use crate::state::{ConfigStore, StateStore};
use crate::task::TaskStatus;

use constrain::{RecoveryKind, TimedLaunchConstrainer};
use monitor::FailureMonitor;
use step::{by_task_name, RecoveryStep};

struct RecoveryInner {
    plan: Plan,
    steps: Vec<Arc<RecoveryStep>>,
    /// (task name, kind) of every current step; when this does not change,
    /// the plan object is kept so operator-visible IDs stay stable.
    fingerprint: Vec<(String, RecoveryKind)>,
}

pub struct RecoveryPlanManager {
    state_store: Arc<dyn StateStore>,
    config_store: Arc<dyn ConfigStore>,
    constrainer: Arc<TimedLaunchConstrainer>,
    monitor: Box<dyn FailureMonitor>,

    /// Strategies survive plan regeneration so interruption state persists.
    plan_strategy: Arc<SerialStrategy>,
    phase_strategy: Arc<ParallelWithErrorsStrategy>,

    inner: Mutex<RecoveryInner>,
}

impl RecoveryPlanManager {
    #[must_use]
    pub fn new(
        state_store: Arc<dyn StateStore>,
        config_store: Arc<dyn ConfigStore>,
        constrainer: TimedLaunchConstrainer,
        monitor: Box<dyn FailureMonitor>,
    ) -> Self {
        let plan_strategy = Arc::new(SerialStrategy::new());
        let phase_strategy = Arc::new(ParallelWithErrorsStrategy::new());
        let plan = empty_plan(&plan_strategy, &phase_strategy);
        Self {
            state_store,
            config_store,
            constrainer: Arc::new(constrainer),
            monitor,
            plan_strategy,
            phase_strategy,
            inner: Mutex::new(RecoveryInner {
                plan,
                steps: Vec::new(),
                fingerprint: Vec::new(),
            }),
        }
    }

    /// Rebuild the recovery plan from the currently-failing task set.
    fn regenerate(&self) {
        let target = match self.config_store.target() {
            Ok(Some(target)) => target,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read config target for recovery");
                return;
            }
        };
        let spec = match self.config_store.fetch(&target) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(error = %e, "Failed to fetch config for recovery");
                return;
            }
        };
        let records = match self.state_store.fetch_tasks() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to scan tasks for recovery");
                return;
            }
        };

        let mut inner = self.lock();
        let preserved = by_task_name(&inner.steps);

        let mut steps: Vec<Arc<RecoveryStep>> = Vec::new();
        let mut fingerprint: Vec<(String, RecoveryKind)> = Vec::new();

        for record in records {
            let Some((pod, task_spec)) = spec.task(&record.info.name) else {
                // The task left the specification; the resource cleaner will
                // collect whatever it reserved.
                continue;
            };

            // Always consult the monitor so a healthy observation resets its
            // failure clock.
            let permanence_declared = self.monitor.has_failed(&record);
            let failed = record.permanently_failed
                || record
                    .status
                    .as_ref()
                    .is_some_and(|s| s.state.needs_recovery(task_spec.goal));
            let kind = if record.permanently_failed || (failed && permanence_declared) {
                RecoveryKind::Permanent
            } else {
                RecoveryKind::Transient
            };

            if let Some(existing) = preserved.get(&record.info.name) {
                let status = existing.status();
                let in_flight = status == Status::Starting;
                let still_relevant =
                    failed && status != Status::Complete && existing.kind() == kind;
                if in_flight || still_relevant {
                    fingerprint.push((record.info.name.clone(), existing.kind()));
                    steps.push(existing.clone());
                    continue;
                }
            }

            if failed {
                debug!(task = %record.info.name, kind = ?kind, "Task needs recovery");
                fingerprint.push((record.info.name.clone(), kind));
                steps.push(Arc::new(RecoveryStep::new(
                    pod,
                    kind,
                    task_spec.clone(),
                    target.clone(),
                    spec.role.clone(),
                    spec.principal.clone(),
                    record.info.resources.clone(),
                    self.constrainer.clone(),
                )));
            }
        }

        if fingerprint == inner.fingerprint {
            return;
        }

        debug!(steps = steps.len(), "Regenerating recovery plan");
        let dyn_steps: Vec<Arc<dyn Step>> = steps
            .iter()
            .map(|s| s.clone() as Arc<dyn Step>)
            .collect();
        let phase = Phase::new("recovery", dyn_steps, self.phase_strategy.clone());
        inner.plan = Plan::new("recovery", vec![phase], self.plan_strategy.clone());
        inner.steps = steps;
        inner.fingerprint = fingerprint;
    }

    fn lock(&self) -> MutexGuard<'_, RecoveryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn empty_plan(
    plan_strategy: &Arc<SerialStrategy>,
    phase_strategy: &Arc<ParallelWithErrorsStrategy>,
) -> Plan {
    let phase = Phase::new("recovery", Vec::new(), phase_strategy.clone());
    Plan::new("recovery", vec![phase], plan_strategy.clone())
}

impl PlanManager for RecoveryPlanManager {
    fn name(&self) -> &str {
        "recovery"
    }

    fn status(&self) -> Status {
        self.lock().plan.status()
    }

    fn candidates(&self, dirty: &BTreeSet<PodInstance>) -> Vec<Arc<dyn Step>> {
        self.regenerate();
        candidates_of(&self.lock().plan, dirty)
    }

    fn update(&self, status: &TaskStatus) {
        let steps: Vec<Arc<RecoveryStep>> = self.lock().steps.clone();
        for step in steps {
            step.update(status);
        }
        self.regenerate();
    }

    fn interrupt(&self) {
        self.plan_strategy.interrupt();
    }

    fn proceed(&self) {
        self.plan_strategy.proceed();
    }

    fn is_interrupted(&self) -> bool {
        self.plan_strategy.is_interrupted()
    }

    fn restart(&self, phase_id: PhaseId, step_id: StepId) -> Result<(), PlanError> {
        find_step(&self.lock().plan, phase_id, step_id)?.restart();
        Ok(())
    }

    fn force_complete(&self, phase_id: PhaseId, step_id: StepId) -> Result<(), PlanError> {
        find_step(&self.lock().plan, phase_id, step_id)?.force_complete();
        Ok(())
    }

    fn report(&self) -> PlanReport {
        report_of(&self.lock().plan)
    }
}
