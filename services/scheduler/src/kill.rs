//! Task killing.
//!
//! Kills go through the driver; the cluster answers with a terminal status
//! that flows back through the normal status path. A destructive kill first
//! marks the task permanently failed so recovery re-reserves instead of
//! relaunching in place.

use std::sync::Arc;

use armada_id::TaskId;
use tracing::{info, warn};

use crate::driver::SchedulerDriver;
use crate::state::StateStore;

pub struct TaskKiller {
    state_store: Arc<dyn StateStore>,
}

impl TaskKiller {
    #[must_use]
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }

    /// Kill one task launch. `destructive` additionally marks the task
    /// permanently failed, so its reservations are torn down on relaunch.
    pub fn kill(&self, driver: &dyn SchedulerDriver, task_id: &TaskId, destructive: bool) {
        if destructive {
            if let Err(e) = self
                .state_store
                .mark_permanently_failed(task_id.task_name())
            {
                warn!(task_id = %task_id, error = %e, "Failed to mark task permanently failed");
            }
        }

        info!(task_id = %task_id, destructive, "Killing task");
        if let Err(e) = driver.kill_task(task_id) {
            // The kill is retried implicitly: the task stays in a state that
            // keeps its step from completing, so the operator sees it.
            warn!(task_id = %task_id, error = %e, "Driver kill failed");
        }
    }
}
