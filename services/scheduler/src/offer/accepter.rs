//! Offer acceptance.
//!
//! Submits recommendations to the driver, one accept call per offer with the
//! operations in recommendation order, then feeds each operation to the
//! registered recorders. The cluster manager's view is authoritative: a
//! recorder failure is logged, never rolled back.

use std::sync::Arc;

use armada_id::OfferId;
use tracing::{error, info, warn};

use crate::driver::SchedulerDriver;
use crate::state::StateStore;
use crate::task::{TaskState, TaskStatus};

use super::recommendation::{OfferRecommendation, Operation};

/// Observes accepted operations, e.g. to persist launched tasks.
pub trait OperationRecorder: Send + Sync {
    fn record(&self, operation: &Operation, offer_id: &OfferId) -> anyhow::Result<()>;
}

/// Groups recommendations per offer and submits them.
pub struct OfferAccepter {
    recorders: Vec<Arc<dyn OperationRecorder>>,
}

impl OfferAccepter {
    #[must_use]
    pub fn new(recorders: Vec<Arc<dyn OperationRecorder>>) -> Self {
        Self { recorders }
    }

    /// Submit recommendations; returns the offer IDs actually accepted.
    ///
    /// An accepted offer is burned regardless of later errors in the same
    /// call.
    pub fn accept(
        &self,
        driver: &dyn SchedulerDriver,
        recommendations: &[OfferRecommendation],
    ) -> Vec<OfferId> {
        let mut accepted: Vec<OfferId> = Vec::new();

        for (offer_id, operations) in group_by_offer(recommendations) {
            let op_names: Vec<String> = operations.iter().map(|op| op.to_string()).collect();
            info!(offer_id = %offer_id, operations = ?op_names, "Accepting offer");

            if let Err(e) = driver.accept_offers(&offer_id, &operations) {
                error!(offer_id = %offer_id, error = %e, "Driver accept failed");
                continue;
            }
            accepted.push(offer_id.clone());

            for operation in &operations {
                for recorder in &self.recorders {
                    if let Err(e) = recorder.record(operation, &offer_id) {
                        // The accept already happened; the recorder's loss is
                        // recovered through reconciliation.
                        warn!(offer_id = %offer_id, error = %e, "Operation recorder failed");
                    }
                }
            }
        }

        accepted
    }
}

/// Group operations by offer, preserving both offer order and operation
/// order within each offer.
fn group_by_offer(recommendations: &[OfferRecommendation]) -> Vec<(OfferId, Vec<Operation>)> {
    let mut groups: Vec<(OfferId, Vec<Operation>)> = Vec::new();
    for rec in recommendations {
        match groups.iter_mut().find(|(id, _)| *id == rec.offer_id) {
            Some((_, ops)) => ops.push(rec.operation.clone()),
            None => groups.push((rec.offer_id.clone(), vec![rec.operation.clone()])),
        }
    }
    groups
}

/// Persists launched tasks into the state store, with an initial STAGING
/// status so reconciliation knows to chase them after a restart.
pub struct LaunchRecorder {
    state_store: Arc<dyn StateStore>,
}

impl LaunchRecorder {
    #[must_use]
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }
}

impl OperationRecorder for LaunchRecorder {
    fn record(&self, operation: &Operation, _offer_id: &OfferId) -> anyhow::Result<()> {
        let Operation::Launch { tasks } = operation else {
            return Ok(());
        };
        for task in tasks {
            self.state_store.store_task(task)?;
            let status = TaskStatus::new(task.task_id.clone(), TaskState::Staging)
                .with_target(task.config_target.clone());
            self.state_store.store_status(&status)?;
        }
        Ok(())
    }
}
