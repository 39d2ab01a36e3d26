//! Task reconciliation.
//!
//! After (re)registration the framework's view of its tasks must be
//! reconfirmed against the cluster, which is the source of truth. Until
//! reconciliation completes, no launches may happen: a step could otherwise
//! double-launch a task the cluster still knows about.
//!
//! Protocol: explicit requests for the remaining unconfirmed task IDs,
//! re-issued with exponential backoff until every ID has been confirmed by a
//! status update; then one implicit (empty) request, which the cluster
//! answers with everything it knows.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use armada_id::TaskId;
use tracing::{info, warn};

use crate::driver::SchedulerDriver;
use crate::state::StateStore;
use crate::task::TaskStatus;

/// Backoff between explicit reconciliation requests.
const BASE_BACKOFF: Duration = Duration::from_secs(8);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct ReconcilerState {
    /// Task IDs known to the framework but not yet confirmed by the cluster.
    remaining: BTreeSet<TaskId>,

    /// Whether the final implicit request has been issued.
    implicit_done: bool,

    backoff: Duration,
    last_request_at: Option<Instant>,
}

/// Tracks which task states the cluster has confirmed since registration.
///
/// Thread-safe: the engine mutates it, status APIs may read it concurrently.
pub struct Reconciler {
    state_store: Arc<dyn StateStore>,
    state: Mutex<ReconcilerState>,
}

impl Reconciler {
    #[must_use]
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self {
            state_store,
            state: Mutex::new(ReconcilerState {
                remaining: BTreeSet::new(),
                implicit_done: false,
                backoff: BASE_BACKOFF,
                last_request_at: None,
            }),
        }
    }

    /// Begin a reconciliation round over every task the state store knows.
    pub fn start(&self) {
        let known: BTreeSet<TaskId> = match self.state_store.fetch_tasks() {
            Ok(records) => records.into_iter().map(|r| r.info.task_id).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to load tasks for reconciliation");
                BTreeSet::new()
            }
        };

        let mut state = self.lock();
        info!(tasks = known.len(), "Starting task reconciliation");
        state.remaining = known;
        state.implicit_done = false;
        state.backoff = BASE_BACKOFF;
        state.last_request_at = None;
    }

    /// Issue any reconciliation request that is due. Expected to be invoked
    /// on every offer batch and status update.
    pub fn reconcile(&self, driver: &dyn SchedulerDriver) {
        let mut state = self.lock();

        if !state.remaining.is_empty() {
            let due = match state.last_request_at {
                None => true,
                Some(at) => at.elapsed() >= state.backoff,
            };
            if !due {
                return;
            }

            let ids: Vec<TaskId> = state.remaining.iter().cloned().collect();
            info!(tasks = ids.len(), "Requesting explicit task reconciliation");
            if let Err(e) = driver.reconcile_tasks(&ids) {
                warn!(error = %e, "Explicit reconciliation request failed");
                return;
            }
            state.last_request_at = Some(Instant::now());
            state.backoff = (state.backoff * 2).min(MAX_BACKOFF);
            return;
        }

        if !state.implicit_done {
            // One empty request: the cluster replies with everything it
            // knows, surfacing tasks we have forgotten about.
            info!("Requesting implicit task reconciliation");
            if let Err(e) = driver.reconcile_tasks(&[]) {
                warn!(error = %e, "Implicit reconciliation request failed");
                return;
            }
            state.implicit_done = true;
        }
    }

    /// Record a status update: the cluster has confirmed this task.
    pub fn update(&self, status: &TaskStatus) {
        let mut state = self.lock();
        if state.remaining.remove(&status.task_id) && state.remaining.is_empty() {
            info!("All known tasks reconciled");
        }
    }

    /// Whether reconciliation is complete and launches may proceed.
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        let state = self.lock();
        state.implicit_done && state.remaining.is_empty()
    }

    /// Snapshot of the unconfirmed task IDs.
    #[must_use]
    pub fn remaining(&self) -> BTreeSet<TaskId> {
        self.lock().remaining.clone()
    }

    /// Force reconciliation complete. May leave the framework's view of
    /// task state inconsistent with the cluster's; not recommended.
    pub fn force_complete(&self) {
        let mut state = self.lock();
        state.remaining.clear();
        state.implicit_done = true;
    }

    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
