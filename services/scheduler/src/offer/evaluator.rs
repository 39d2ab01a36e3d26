//! Offer evaluation.
//!
//! Matches an [`OfferRequirement`] against an ordered batch of offers. The
//! first offer that fully satisfies the requirement wins; the output either
//! fulfills the requirement using exactly that one offer or is empty. Partial
//! plans are never emitted.

use armada_spec::{PortRange, ResourceValue, VolumeSpec};
use tracing::debug;
use ulid::Ulid;

use super::recommendation::{OfferRecommendation, Operation};
use super::requirement::OfferRequirement;
use super::{DiskInfo, Offer, Reservation, Resource, TaskInfo};

/// Scalar comparisons tolerate accumulated floating point error.
const EPSILON: f64 = 1e-9;

/// Matches offer requirements against offers.
#[derive(Debug, Default)]
pub struct OfferEvaluator;

impl OfferEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a requirement against a batch of offers, in arrival order.
    ///
    /// Returns the recommendations that fulfill the requirement from the
    /// first satisfying offer, or an empty list when no offer satisfies it.
    pub fn evaluate(
        &self,
        requirement: &OfferRequirement,
        offers: &[Offer],
    ) -> Vec<OfferRecommendation> {
        for offer in offers {
            if let Some(recommendations) = evaluate_offer(requirement, offer) {
                debug!(
                    offer_id = %offer.id,
                    pod = %requirement.pod,
                    operations = recommendations.len(),
                    "Offer satisfies requirement"
                );
                return recommendations;
            }
        }

        debug!(
            pod = %requirement.pod,
            offers = offers.len(),
            "No offer satisfies requirement"
        );
        Vec::new()
    }
}

/// Try to satisfy the whole requirement from a single offer.
fn evaluate_offer(req: &OfferRequirement, offer: &Offer) -> Option<Vec<OfferRecommendation>> {
    // Placement first: an offer from an unacceptable agent never matches,
    // regardless of its resources.
    if let Some(rule) = &req.placement {
        if !rule.allows(offer.agent_id.as_str(), &offer.attributes) {
            return None;
        }
    }
    for task in &req.tasks {
        if let Some(rule) = &task.placement {
            if !rule.allows(offer.agent_id.as_str(), &offer.attributes) {
                return None;
            }
        }
    }

    // A teardown requirement only matches the offer carrying the stale
    // reservations; they are offered back on the agent that holds them.
    if !req.teardown.is_empty() && !contains_all(offer, &req.teardown) {
        return None;
    }

    // Work from a consumable pool of the offer's resources, excluding the
    // stale ones being torn down.
    let mut pool = Pool::new(offer, &req.teardown);

    let mut reserves: Vec<Resource> = Vec::new();
    let mut creates: Vec<Resource> = Vec::new();
    let mut task_infos: Vec<TaskInfo> = Vec::new();

    for task in &req.tasks {
        let mut assigned: Vec<Resource> = Vec::new();

        for ask in &task.resources {
            let resource = match &ask.value {
                ResourceValue::Scalar(amount) => {
                    pool.take_scalar(&ask.name, *amount, &req.role, &req.principal)?
                }
                ResourceValue::Ranges(ranges) => {
                    pool.take_ranges(&ask.name, ranges, &req.role, &req.principal)?
                }
            };
            assigned.push(resource);
        }

        for volume in &task.volumes {
            match pool.take_volume(volume, &req.role, &req.principal)? {
                VolumeMatch::Existing(resource) => assigned.push(resource),
                VolumeMatch::Fresh { reserve, volume } => {
                    reserves.push(reserve);
                    creates.push(volume.clone());
                    assigned.push(volume);
                }
            }
        }

        task_infos.push(TaskInfo {
            task_id: task.task_id.clone(),
            name: task.name.clone(),
            pod: req.pod.clone(),
            agent_id: offer.agent_id.clone(),
            command: task.command.clone(),
            resources: assigned,
            config_target: req.config_target.clone(),
            health_check: task.health_check.clone(),
        });
    }

    let mut operations: Vec<Operation> = Vec::new();

    // Stale volumes are destroyed while their reservation is still held,
    // then the reservations are released.
    let stale_volumes: Vec<Resource> = req
        .teardown
        .iter()
        .filter(|r| r.disk.is_some())
        .cloned()
        .collect();
    if !stale_volumes.is_empty() {
        operations.push(Operation::Destroy {
            volumes: stale_volumes,
        });
    }
    let stale_reserved: Vec<Resource> = req
        .teardown
        .iter()
        .filter(|r| r.reservation.is_some())
        .cloned()
        .collect();
    if !stale_reserved.is_empty() {
        operations.push(Operation::Unreserve {
            resources: stale_reserved,
        });
    }

    if !reserves.is_empty() {
        operations.push(Operation::Reserve {
            resources: reserves,
        });
    }
    if !creates.is_empty() {
        operations.push(Operation::Create { volumes: creates });
    }
    operations.push(Operation::Launch { tasks: task_infos });

    Some(
        operations
            .into_iter()
            .map(|op| OfferRecommendation::new(offer.id.clone(), offer.agent_id.clone(), op))
            .collect(),
    )
}

/// Whether the offer carries every stale resource, matched by reservation
/// label or volume ID.
fn contains_all(offer: &Offer, stale: &[Resource]) -> bool {
    stale.iter().all(|s| {
        offer.resources.iter().any(|r| matches_stale(r, s))
    })
}

fn matches_stale(offered: &Resource, stale: &Resource) -> bool {
    match (&stale.disk, &offered.disk) {
        (Some(stale_disk), Some(offered_disk)) => stale_disk.volume_id == offered_disk.volume_id,
        (Some(_), None) => false,
        (None, _) => match (&stale.reservation, &offered.reservation) {
            (Some(s), Some(o)) => s.resource_id == o.resource_id,
            _ => false,
        },
    }
}

/// Outcome of matching a volume requirement.
enum VolumeMatch {
    /// The offer already carries the created volume; relaunch in place.
    Existing(Resource),

    /// A fresh reservation and volume must be created from unreserved disk.
    Fresh { reserve: Resource, volume: Resource },
}

/// A consumable view of one offer's resources.
struct Pool {
    resources: Vec<Resource>,
}

impl Pool {
    fn new(offer: &Offer, teardown: &[Resource]) -> Self {
        let resources = offer
            .resources
            .iter()
            .filter(|r| !teardown.iter().any(|s| matches_stale(r, s)))
            .cloned()
            .collect::<Vec<Resource>>();
        Self { resources }
    }

    /// Take `amount` of a scalar resource, preferring resources already
    /// reserved for this role/principal over unreserved ones.
    fn take_scalar(
        &mut self,
        name: &str,
        amount: f64,
        role: &str,
        principal: &str,
    ) -> Option<Resource> {
        for reserved in [true, false] {
            let found = self.resources.iter_mut().find(|r| {
                let class_matches = if reserved {
                    r.reserved_for(role, principal)
                } else {
                    // Resources reserved for someone else are never ours to use.
                    r.reservation.is_none()
                };
                r.name == name
                    && r.disk.is_none()
                    && class_matches
                    && r.scalar_value().is_some_and(|v| v + EPSILON >= amount)
            });
            if let Some(resource) = found {
                let reservation = resource.reservation.clone();
                consume_scalar(resource, amount);
                self.prune();
                return Some(Resource {
                    name: name.to_string(),
                    value: ResourceValue::Scalar(amount),
                    reservation,
                    disk: None,
                });
            }
        }
        None
    }

    /// Take specific ranges (e.g. ports). Each requirement's ranges must all
    /// be contained within a single offered resource.
    fn take_ranges(
        &mut self,
        name: &str,
        wanted: &[PortRange],
        role: &str,
        principal: &str,
    ) -> Option<Resource> {
        for reserved in [true, false] {
            let found = self.resources.iter_mut().find(|r| {
                let class_matches = if reserved {
                    r.reserved_for(role, principal)
                } else {
                    r.reservation.is_none()
                };
                r.name == name && class_matches && ranges_contain(&r.value, wanted)
            });
            if let Some(resource) = found {
                let reservation = resource.reservation.clone();
                consume_ranges(resource, wanted);
                self.prune();
                return Some(Resource {
                    name: name.to_string(),
                    value: ResourceValue::Ranges(wanted.to_vec()),
                    reservation,
                    disk: None,
                });
            }
        }
        None
    }

    /// Satisfy a volume requirement: either the already-created volume is in
    /// the offer, or unreserved disk is carved into a fresh reservation plus
    /// volume.
    fn take_volume(
        &mut self,
        volume: &VolumeSpec,
        role: &str,
        principal: &str,
    ) -> Option<VolumeMatch> {
        let existing = self.resources.iter().position(|r| {
            r.reserved_for(role, principal)
                && r.disk
                    .as_ref()
                    .is_some_and(|d| d.container_path == volume.container_path)
        });
        if let Some(idx) = existing {
            return Some(VolumeMatch::Existing(self.resources.remove(idx)));
        }

        let size = volume.size_mb as f64;
        let found = self.resources.iter_mut().find(|r| {
            r.name == "disk"
                && r.reservation.is_none()
                && r.disk.is_none()
                && r.scalar_value().is_some_and(|v| v + EPSILON >= size)
        })?;
        consume_scalar(found, size);
        self.prune();

        let reservation = Reservation {
            role: role.to_string(),
            principal: principal.to_string(),
            resource_id: Ulid::new().to_string(),
        };
        let reserve = Resource {
            name: "disk".to_string(),
            value: ResourceValue::Scalar(size),
            reservation: Some(reservation.clone()),
            disk: None,
        };
        let created = Resource {
            name: "disk".to_string(),
            value: ResourceValue::Scalar(size),
            reservation: Some(reservation),
            disk: Some(DiskInfo {
                volume_id: Ulid::new().to_string(),
                container_path: volume.container_path.clone(),
            }),
        };
        Some(VolumeMatch::Fresh {
            reserve,
            volume: created,
        })
    }

    /// Drop resources that have been fully consumed.
    fn prune(&mut self) {
        self.resources.retain(|r| match &r.value {
            ResourceValue::Scalar(v) => *v > EPSILON,
            ResourceValue::Ranges(ranges) => !ranges.is_empty(),
        });
    }
}

fn consume_scalar(resource: &mut Resource, amount: f64) {
    if let ResourceValue::Scalar(v) = &mut resource.value {
        *v -= amount;
    }
}

fn ranges_contain(value: &ResourceValue, wanted: &[PortRange]) -> bool {
    let ResourceValue::Ranges(offered) = value else {
        return false;
    };
    wanted
        .iter()
        .all(|w| offered.iter().any(|o| o.begin <= w.begin && w.end <= o.end))
}

fn consume_ranges(resource: &mut Resource, wanted: &[PortRange]) {
    let ResourceValue::Ranges(offered) = &mut resource.value else {
        return;
    };
    let mut remaining: Vec<PortRange> = Vec::new();
    for range in offered.iter() {
        let mut pieces = vec![*range];
        for w in wanted {
            let mut next: Vec<PortRange> = Vec::new();
            for piece in pieces {
                if w.end < piece.begin || w.begin > piece.end {
                    next.push(piece);
                    continue;
                }
                if piece.begin < w.begin {
                    next.push(PortRange::new(piece.begin, w.begin - 1));
                }
                if w.end < piece.end {
                    next.push(PortRange::new(w.end + 1, piece.end));
                }
            }
            pieces = next;
        }
        remaining.extend(pieces);
    }
    *offered = remaining;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use armada_id::{AgentId, OfferId, TaskId};
    use armada_spec::{ConfigTarget, PlacementRule, PodInstance, ResourceSpec};

    use super::super::recommendation::launched_task_ids;
    use super::*;

    fn offer(id: &str, resources: Vec<Resource>) -> Offer {
        Offer {
            id: OfferId::parse(id).unwrap(),
            agent_id: AgentId::parse("agent-1").unwrap(),
            hostname: "host-1".to_string(),
            attributes: BTreeMap::new(),
            resources,
        }
    }

    fn requirement(tasks: Vec<super::super::requirement::TaskRequirement>) -> OfferRequirement {
        OfferRequirement {
            pod: PodInstance::new("node", 0),
            config_target: ConfigTarget::from_raw("sha256:test"),
            role: "svc-role".to_string(),
            principal: "svc-principal".to_string(),
            placement: None,
            tasks,
            teardown: vec![],
            kill_first: vec![],
        }
    }

    fn task_req(name: &str, cpus: f64, mem: f64) -> super::super::requirement::TaskRequirement {
        super::super::requirement::TaskRequirement {
            task_id: TaskId::new(name),
            name: name.to_string(),
            command: "./run".to_string(),
            resources: vec![
                ResourceSpec::scalar("cpus", cpus),
                ResourceSpec::scalar("mem", mem),
            ],
            volumes: vec![],
            placement: None,
            health_check: None,
        }
    }

    #[test]
    fn test_two_tasks_one_offer_one_launch() {
        let req = requirement(vec![task_req("t1", 1.0, 1000.0), task_req("t2", 1.0, 500.0)]);
        let offers = vec![offer(
            "o1",
            vec![Resource::scalar("cpus", 4.0), Resource::scalar("mem", 2000.0)],
        )];

        let recs = OfferEvaluator::new().evaluate(&req, &offers);
        assert_eq!(recs.len(), 1);
        assert!(matches!(recs[0].operation, Operation::Launch { .. }));
        assert_eq!(launched_task_ids(&recs).len(), 2);
    }

    #[test]
    fn test_insufficient_offer_yields_nothing() {
        let req = requirement(vec![task_req("t1", 2.0, 4000.0)]);
        let offers = vec![offer(
            "o1",
            vec![Resource::scalar("cpus", 4.0), Resource::scalar("mem", 2000.0)],
        )];

        assert!(OfferEvaluator::new().evaluate(&req, &offers).is_empty());
    }

    #[test]
    fn test_first_satisfying_offer_wins() {
        let req = requirement(vec![task_req("t1", 1.0, 1000.0)]);
        let offers = vec![
            offer("small", vec![Resource::scalar("cpus", 0.5)]),
            offer(
                "big-a",
                vec![Resource::scalar("cpus", 2.0), Resource::scalar("mem", 2000.0)],
            ),
            offer(
                "big-b",
                vec![Resource::scalar("cpus", 2.0), Resource::scalar("mem", 2000.0)],
            ),
        ];

        let recs = OfferEvaluator::new().evaluate(&req, &offers);
        assert!(!recs.is_empty());
        assert!(recs.iter().all(|r| r.offer_id.as_str() == "big-a"));
    }

    #[test]
    fn test_placement_rule_rejects_agent() {
        let mut req = requirement(vec![task_req("t1", 1.0, 100.0)]);
        req.placement = Some(PlacementRule::AvoidAgents {
            agents: vec!["agent-1".to_string()],
        });
        let offers = vec![offer(
            "o1",
            vec![Resource::scalar("cpus", 4.0), Resource::scalar("mem", 2000.0)],
        )];

        assert!(OfferEvaluator::new().evaluate(&req, &offers).is_empty());
    }

    #[test]
    fn test_prefers_reserved_resources() {
        let req = requirement(vec![task_req("t1", 1.0, 100.0)]);
        let reserved_cpus = Resource {
            name: "cpus".to_string(),
            value: ResourceValue::Scalar(1.0),
            reservation: Some(Reservation {
                role: "svc-role".to_string(),
                principal: "svc-principal".to_string(),
                resource_id: "res-1".to_string(),
            }),
            disk: None,
        };
        let offers = vec![offer(
            "o1",
            vec![
                Resource::scalar("cpus", 4.0),
                reserved_cpus,
                Resource::scalar("mem", 2000.0),
            ],
        )];

        let recs = OfferEvaluator::new().evaluate(&req, &offers);
        let Operation::Launch { tasks } = &recs[0].operation else {
            panic!("expected launch");
        };
        let cpus = tasks[0].resources.iter().find(|r| r.name == "cpus").unwrap();
        assert_eq!(
            cpus.reservation.as_ref().map(|r| r.resource_id.as_str()),
            Some("res-1")
        );
    }

    #[test]
    fn test_fresh_volume_emits_reserve_create_launch() {
        let mut req = requirement(vec![task_req("t1", 1.0, 100.0)]);
        req.tasks[0].volumes = vec![VolumeSpec {
            container_path: "data".to_string(),
            size_mb: 1000,
        }];
        let offers = vec![offer(
            "o1",
            vec![
                Resource::scalar("cpus", 4.0),
                Resource::scalar("mem", 2000.0),
                Resource::scalar("disk", 5000.0),
            ],
        )];

        let recs = OfferEvaluator::new().evaluate(&req, &offers);
        let ops: Vec<_> = recs.iter().map(|r| format!("{}", r.operation)).collect();
        assert_eq!(ops, vec!["RESERVE(1)", "CREATE(1)", "LAUNCH(1)"]);
    }

    #[test]
    fn test_existing_volume_relaunches_in_place() {
        let reservation = Reservation {
            role: "svc-role".to_string(),
            principal: "svc-principal".to_string(),
            resource_id: "res-disk".to_string(),
        };
        let existing_volume = Resource {
            name: "disk".to_string(),
            value: ResourceValue::Scalar(1000.0),
            reservation: Some(reservation),
            disk: Some(DiskInfo {
                volume_id: "vol-1".to_string(),
                container_path: "data".to_string(),
            }),
        };
        let mut req = requirement(vec![task_req("t1", 1.0, 100.0)]);
        req.tasks[0].volumes = vec![VolumeSpec {
            container_path: "data".to_string(),
            size_mb: 1000,
        }];
        let offers = vec![offer(
            "o1",
            vec![
                Resource::scalar("cpus", 4.0),
                Resource::scalar("mem", 2000.0),
                existing_volume,
            ],
        )];

        let recs = OfferEvaluator::new().evaluate(&req, &offers);
        assert_eq!(recs.len(), 1);
        assert!(matches!(recs[0].operation, Operation::Launch { .. }));
    }

    #[test]
    fn test_teardown_requires_matching_offer() {
        let stale = Resource {
            name: "disk".to_string(),
            value: ResourceValue::Scalar(1000.0),
            reservation: Some(Reservation {
                role: "svc-role".to_string(),
                principal: "svc-principal".to_string(),
                resource_id: "res-old".to_string(),
            }),
            disk: Some(DiskInfo {
                volume_id: "vol-old".to_string(),
                container_path: "data".to_string(),
            }),
        };
        let mut req = requirement(vec![task_req("t1", 1.0, 100.0)]);
        req.tasks[0].volumes = vec![VolumeSpec {
            container_path: "data".to_string(),
            size_mb: 1000,
        }];
        req.teardown = vec![stale.clone()];

        // An offer without the stale reservation cannot match.
        let plain = vec![offer(
            "o1",
            vec![
                Resource::scalar("cpus", 4.0),
                Resource::scalar("mem", 2000.0),
                Resource::scalar("disk", 5000.0),
            ],
        )];
        assert!(OfferEvaluator::new().evaluate(&req, &plain).is_empty());

        // The offer carrying it tears down, re-reserves and launches.
        let carrying = vec![offer(
            "o2",
            vec![
                Resource::scalar("cpus", 4.0),
                Resource::scalar("mem", 2000.0),
                Resource::scalar("disk", 5000.0),
                stale,
            ],
        )];
        let recs = OfferEvaluator::new().evaluate(&req, &carrying);
        let ops: Vec<_> = recs.iter().map(|r| format!("{}", r.operation)).collect();
        assert_eq!(
            ops,
            vec![
                "DESTROY(1)",
                "UNRESERVE(1)",
                "RESERVE(1)",
                "CREATE(1)",
                "LAUNCH(1)"
            ]
        );
    }

    #[test]
    fn test_port_ranges_consumed() {
        let mut req = requirement(vec![task_req("t1", 1.0, 100.0)]);
        req.tasks[0]
            .resources
            .push(ResourceSpec::ranges("ports", vec![PortRange::new(8080, 8081)]));
        let offers = vec![offer(
            "o1",
            vec![
                Resource::scalar("cpus", 4.0),
                Resource::scalar("mem", 2000.0),
                Resource::ranges("ports", vec![PortRange::new(8000, 9000)]),
            ],
        )];

        let recs = OfferEvaluator::new().evaluate(&req, &offers);
        assert!(!recs.is_empty());

        // Asking for ports outside the offered range fails.
        let mut bad = requirement(vec![task_req("t2", 1.0, 100.0)]);
        bad.tasks[0]
            .resources
            .push(ResourceSpec::ranges("ports", vec![PortRange::new(80, 81)]));
        assert!(OfferEvaluator::new().evaluate(&bad, &offers).is_empty());
    }

    #[test]
    fn test_no_partial_plan_when_second_task_unsatisfied() {
        // First task fits, second does not: nothing may be emitted.
        let req = requirement(vec![task_req("t1", 1.0, 1000.0), task_req("t2", 8.0, 500.0)]);
        let offers = vec![offer(
            "o1",
            vec![Resource::scalar("cpus", 4.0), Resource::scalar("mem", 2000.0)],
        )];

        assert!(OfferEvaluator::new().evaluate(&req, &offers).is_empty());
    }
}
