//! Resource cleanup.
//!
//! Reserved resources can leak: an agent can disappear long enough for its
//! tasks to be relocated, then come back and offer the old reservations
//! again. The cleaner inspects offers left over after plan coordination and
//! releases any reservation or persistent volume that no live task expects.
//! Volumes are destroyed before their backing reservations are released.

use std::collections::BTreeSet;
use std::sync::Arc;

use armada_id::OfferId;
use tracing::{info, warn};

use crate::driver::SchedulerDriver;
use crate::offer::accepter::OfferAccepter;
use crate::offer::recommendation::{OfferRecommendation, Operation};
use crate::offer::{Offer, Resource};
use crate::state::StateStore;

pub struct ResourceCleaner {
    state_store: Arc<dyn StateStore>,
}

impl ResourceCleaner {
    #[must_use]
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }

    /// Recommendations to release every unexpected reservation and volume in
    /// the given offers. DESTROY recommendations for one offer precede its
    /// UNRESERVEs.
    pub fn evaluate(&self, offers: &[Offer]) -> Vec<OfferRecommendation> {
        let (expected_reservations, expected_volumes) = match self.expected_ids() {
            Ok(expected) => expected,
            Err(e) => {
                warn!(error = %e, "Failed to load expected resources; skipping cleanup");
                return Vec::new();
            }
        };

        let mut recommendations = Vec::new();
        for offer in offers {
            let stale_volumes: Vec<Resource> = offer
                .resources
                .iter()
                .filter(|r| {
                    r.disk
                        .as_ref()
                        .is_some_and(|d| !expected_volumes.contains(&d.volume_id))
                })
                .cloned()
                .collect();

            let stale_reservations: Vec<Resource> = offer
                .resources
                .iter()
                .filter(|r| {
                    r.reservation
                        .as_ref()
                        .is_some_and(|res| !expected_reservations.contains(&res.resource_id))
                })
                .cloned()
                .collect();

            if !stale_volumes.is_empty() {
                recommendations.push(OfferRecommendation::new(
                    offer.id.clone(),
                    offer.agent_id.clone(),
                    Operation::Destroy {
                        volumes: stale_volumes,
                    },
                ));
            }
            if !stale_reservations.is_empty() {
                recommendations.push(OfferRecommendation::new(
                    offer.id.clone(),
                    offer.agent_id.clone(),
                    Operation::Unreserve {
                        resources: stale_reservations,
                    },
                ));
            }
        }
        recommendations
    }

    /// Reservation labels and volume IDs of every task that still owns its
    /// resources. A permanently-failed task's resources are fair game.
    fn expected_ids(&self) -> Result<(BTreeSet<String>, BTreeSet<String>), crate::error::StoreError> {
        let mut reservations = BTreeSet::new();
        let mut volumes = BTreeSet::new();
        for record in self.state_store.fetch_tasks()? {
            if record.permanently_failed {
                continue;
            }
            for resource in &record.info.resources {
                if let Some(reservation) = &resource.reservation {
                    reservations.insert(reservation.resource_id.clone());
                }
                if let Some(disk) = &resource.disk {
                    volumes.insert(disk.volume_id.clone());
                }
            }
        }
        Ok((reservations, volumes))
    }
}

/// Runs the cleaner over leftover offers and submits the results.
pub struct ResourceCleanerScheduler {
    cleaner: ResourceCleaner,
    accepter: OfferAccepter,
}

impl ResourceCleanerScheduler {
    #[must_use]
    pub fn new(cleaner: ResourceCleaner, accepter: OfferAccepter) -> Self {
        Self { cleaner, accepter }
    }

    /// Returns the IDs of offers accepted for cleanup.
    pub fn resource_offers(&self, driver: &dyn SchedulerDriver, offers: &[Offer]) -> Vec<OfferId> {
        let recommendations = self.cleaner.evaluate(offers);
        if recommendations.is_empty() {
            return Vec::new();
        }
        info!(operations = recommendations.len(), "Cleaning leaked resources");
        self.accepter.accept(driver, &recommendations)
    }
}
