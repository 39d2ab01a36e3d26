//! Outbound driver abstraction.
//!
//! The driver is the semantic surface of the cluster manager RPC: accept and
//! decline offers, kill tasks, request reconciliation, and gate offer
//! delivery with suppress/revive. The wire encoding lives behind an
//! implementation of this trait; only the serial engine calls it.

use armada_id::{OfferId, TaskId};
use tracing::info;

use crate::error::DriverError;
use crate::offer::recommendation::Operation;

/// Outbound calls to the cluster manager.
pub trait SchedulerDriver: Send + Sync {
    /// Accept one offer with an ordered list of operations. The accept is
    /// authoritative once this returns: the offer is burned either way.
    fn accept_offers(&self, offer_id: &OfferId, operations: &[Operation])
        -> Result<(), DriverError>;

    /// Decline one offer.
    fn decline_offer(&self, offer_id: &OfferId) -> Result<(), DriverError>;

    /// Kill a running task. The cluster answers with a terminal status.
    fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError>;

    /// Ask the cluster to re-send statuses for the listed tasks. An empty
    /// list requests implicit reconciliation of everything it knows.
    fn reconcile_tasks(&self, task_ids: &[TaskId]) -> Result<(), DriverError>;

    /// Pause offer delivery; there is no work to place.
    fn suppress_offers(&self) -> Result<(), DriverError>;

    /// Resume offer delivery.
    fn revive_offers(&self) -> Result<(), DriverError>;
}

/// A driver that logs outbound calls and drops them.
///
/// Used for dry runs of the engine when no cluster manager transport is
/// wired in.
#[derive(Debug, Default)]
pub struct LoggingDriver;

impl SchedulerDriver for LoggingDriver {
    fn accept_offers(
        &self,
        offer_id: &OfferId,
        operations: &[Operation],
    ) -> Result<(), DriverError> {
        let ops: Vec<String> = operations.iter().map(|op| op.to_string()).collect();
        info!(offer_id = %offer_id, operations = ?ops, "accept_offers (dry run)");
        Ok(())
    }

    fn decline_offer(&self, offer_id: &OfferId) -> Result<(), DriverError> {
        info!(offer_id = %offer_id, "decline_offer (dry run)");
        Ok(())
    }

    fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError> {
        info!(task_id = %task_id, "kill_task (dry run)");
        Ok(())
    }

    fn reconcile_tasks(&self, task_ids: &[TaskId]) -> Result<(), DriverError> {
        info!(count = task_ids.len(), "reconcile_tasks (dry run)");
        Ok(())
    }

    fn suppress_offers(&self) -> Result<(), DriverError> {
        info!("suppress_offers (dry run)");
        Ok(())
    }

    fn revive_offers(&self) -> Result<(), DriverError> {
        info!("revive_offers (dry run)");
        Ok(())
    }
}
