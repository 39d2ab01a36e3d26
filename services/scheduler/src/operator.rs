//! Operator handles.
//!
//! The HTTP surface that exposes plans and task state lives outside this
//! crate; what it binds to is this handle struct, delivered through the
//! engine's readiness handshake once plans exist. Everything here is safe to
//! call from any thread: reads snapshot, controls go through the same
//! interior mutability the engine uses.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::engine::EventSender;
use crate::error::StoreError;
use crate::plan::coordinator::{CoordinatorState, PlanCoordinator};
use crate::plan::manager::{PlanError, PlanManager, PlanReport};
use crate::state::{StateStore, TaskRecord};

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cloneable handle onto the running engine's plans and task state.
#[derive(Clone)]
pub struct OperatorHandles {
    coordinator: Arc<PlanCoordinator>,
    state_store: Arc<dyn StateStore>,
    events: EventSender,
}

impl OperatorHandles {
    #[must_use]
    pub(crate) fn new(
        coordinator: Arc<PlanCoordinator>,
        state_store: Arc<dyn StateStore>,
        events: EventSender,
    ) -> Self {
        Self {
            coordinator,
            state_store,
            events,
        }
    }

    /// Snapshot of every plan: status tree, step states, interrupted flags.
    #[must_use]
    pub fn plans(&self) -> Vec<PlanReport> {
        self.coordinator.reports()
    }

    /// Snapshot of one plan by name.
    pub fn plan(&self, name: &str) -> Result<PlanReport, OperatorError> {
        self.coordinator
            .manager(name)
            .map(|m| m.report())
            .ok_or_else(|| OperatorError::UnknownPlan(name.to_string()))
    }

    /// Pause a plan's rollout.
    pub fn interrupt(&self, plan: &str) -> Result<(), OperatorError> {
        let manager = self
            .coordinator
            .manager(plan)
            .ok_or_else(|| OperatorError::UnknownPlan(plan.to_string()))?;
        manager.interrupt();
        self.coordinator.publish();
        Ok(())
    }

    /// Resume a paused plan.
    pub fn proceed(&self, plan: &str) -> Result<(), OperatorError> {
        let manager = self
            .coordinator
            .manager(plan)
            .ok_or_else(|| OperatorError::UnknownPlan(plan.to_string()))?;
        manager.proceed();
        self.coordinator.publish();
        Ok(())
    }

    /// Rerun one step from PENDING.
    pub fn restart_step(
        &self,
        plan: &str,
        phase_id: armada_id::PhaseId,
        step_id: armada_id::StepId,
    ) -> Result<(), OperatorError> {
        let manager = self
            .coordinator
            .manager(plan)
            .ok_or_else(|| OperatorError::UnknownPlan(plan.to_string()))?;
        manager.restart(phase_id, step_id)?;
        self.coordinator.publish();
        Ok(())
    }

    /// Declare one step done without running it.
    pub fn force_complete_step(
        &self,
        plan: &str,
        phase_id: armada_id::PhaseId,
        step_id: armada_id::StepId,
    ) -> Result<(), OperatorError> {
        let manager = self
            .coordinator
            .manager(plan)
            .ok_or_else(|| OperatorError::UnknownPlan(plan.to_string()))?;
        manager.force_complete(phase_id, step_id)?;
        self.coordinator.publish();
        Ok(())
    }

    /// All known tasks with their last statuses.
    pub fn tasks(&self) -> Result<Vec<TaskRecord>, OperatorError> {
        Ok(self.state_store.fetch_tasks()?)
    }

    /// Kill a task so the scheduler relaunches it in place.
    pub fn restart_task(&self, task_name: &str) {
        self.events.kill_task(task_name.to_string(), false);
    }

    /// Kill a task and mark it permanently failed, forcing recovery to tear
    /// down its reservations and re-reserve elsewhere.
    pub fn replace_task(&self, task_name: &str) {
        self.events.kill_task(task_name.to_string(), true);
    }

    /// Subscribe to plan status changes.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<CoordinatorState> {
        self.coordinator.subscribe()
    }
}
