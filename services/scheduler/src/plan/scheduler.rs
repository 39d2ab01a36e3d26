//! The plan scheduler: drives one candidate step through an offer batch.
//!
//! Contract, in order:
//! - empty inputs: empty result, logged at info
//! - step not PENDING: empty result
//! - `start()` returning nothing: the step is told no offers were used
//! - evaluation finding nothing: same, and the offers surface back unused
//! - otherwise accept, and report the set of launched task IDs back to the
//!   step (possibly empty when only reservations landed)
//!
//! Every call is side-effect-committing: an accepted offer stays burned no
//! matter what happens later in the cycle.

use std::collections::BTreeSet;

use armada_id::{OfferId, TaskId};
use tracing::{info, warn};

use crate::driver::SchedulerDriver;
use crate::kill::TaskKiller;
use crate::offer::accepter::OfferAccepter;
use crate::offer::evaluator::OfferEvaluator;
use crate::offer::recommendation::launched_task_ids;
use crate::offer::Offer;

use super::step::Step;
use super::Status;

pub struct PlanScheduler {
    evaluator: OfferEvaluator,
    accepter: OfferAccepter,
    killer: TaskKiller,
}

impl PlanScheduler {
    #[must_use]
    pub fn new(evaluator: OfferEvaluator, accepter: OfferAccepter, killer: TaskKiller) -> Self {
        Self {
            evaluator,
            accepter,
            killer,
        }
    }

    /// Offer the batch to one step; returns the offer IDs accepted on its
    /// behalf.
    pub fn resource_offers(
        &self,
        driver: &dyn SchedulerDriver,
        offers: &[Offer],
        step: &dyn Step,
    ) -> Vec<OfferId> {
        if offers.is_empty() {
            info!(step = %step.name(), "No offers to process");
            return Vec::new();
        }

        if step.status() != Status::Pending {
            info!(step = %step.name(), status = %step.status(), "Ignoring offers for non-pending step");
            return Vec::new();
        }

        let Some(requirement) = step.start() else {
            info!(step = %step.name(), "Step has no offer requirement");
            step.update_offer_status(None);
            return Vec::new();
        };

        // Superseded launches die before their replacements go out.
        for task_id in &requirement.kill_first {
            self.killer.kill(driver, task_id, false);
        }

        let recommendations = self.evaluator.evaluate(&requirement, offers);
        if recommendations.is_empty() {
            // Out of space on the cluster? The offers surface back as unused
            // and are declined at end of cycle.
            warn!(
                step = %step.name(),
                offers = offers.len(),
                "No offers fulfill the step's requirement"
            );
            step.update_offer_status(None);
            return Vec::new();
        }

        let accepted = self.accepter.accept(driver, &recommendations);
        if accepted.is_empty() {
            step.update_offer_status(None);
            return accepted;
        }

        let launched: BTreeSet<TaskId> = launched_task_ids(&recommendations).into_iter().collect();
        step.update_offer_status(Some(launched));
        accepted
    }
}
