//! Recovery scenarios: dirty-asset exclusion and permanent failure.

mod harness;

use armada_scheduler::offer::recommendation::Operation;
use armada_scheduler::offer::Resource;
use armada_scheduler::plan::Status;
use armada_scheduler::state::{ConfigStore, StateStore};
use armada_scheduler::task::{TaskState, TaskStatus};
use harness::*;

#[test]
fn deployment_gets_first_refusal_for_a_shared_pod() {
    // Pod a/0 failed mid-deployment: its deployment step is pending again
    // AND recovery sees a failed task for the same pod.
    let spec = service(vec![pod("a", 0, vec![task("t1", 1.0, 100.0)])]);
    let mut scheduler = Scheduler::new(instant_config(), spec);
    scheduler.register();

    scheduler.offer(vec![cpus_mem_offer("o1", 4.0, 2000.0)]);
    let first_launch = scheduler.driver.launched()[0].task_id.clone();
    scheduler.status(
        TaskStatus::new(first_launch, TaskState::Failed)
            .with_target(scheduler.config_store.target().unwrap().unwrap()),
    );
    scheduler.driver.clear();

    // Deployment is offered first; recovery then sees a/0 dirty and skips it
    // this cycle, so exactly one launch goes out.
    scheduler.offer(vec![
        cpus_mem_offer("o2", 4.0, 2000.0),
        cpus_mem_offer("o3", 4.0, 2000.0),
    ]);
    let launched = scheduler.driver.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].name, "t1");
    assert_eq!(scheduler.driver.accepts().len(), 1);
}

#[test]
fn transient_failure_relaunches_after_deployment_completes() {
    let spec = service(vec![pod("a", 0, vec![task("t1", 1.0, 100.0)])]);
    // Default config: the permanence timeout is long, so this failure stays
    // transient.
    let mut scheduler = Scheduler::new(armada_scheduler::config::Config::default(), spec);
    let handles = scheduler.register();

    scheduler.offer(vec![cpus_mem_offer("o1", 4.0, 2000.0)]);
    scheduler.confirm_running();
    assert_eq!(handles.plan("deploy").unwrap().status, Status::Complete);

    // The deployed task dies. The deployment plan stays complete; recovery
    // owns the relaunch.
    let task_id = scheduler.driver.launched()[0].task_id.clone();
    scheduler.status(
        TaskStatus::new(task_id, TaskState::Failed)
            .with_target(scheduler.config_store.target().unwrap().unwrap()),
    );
    assert_eq!(handles.plan("deploy").unwrap().status, Status::Complete);
    assert_ne!(handles.plan("recovery").unwrap().status, Status::Complete);
    scheduler.driver.clear();

    scheduler.offer(vec![cpus_mem_offer("o2", 4.0, 2000.0)]);
    let launched = scheduler.driver.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].name, "t1");

    // No teardown for a transient recovery.
    let ops = &scheduler.driver.accepts()[0].1;
    assert!(ops
        .iter()
        .all(|op| matches!(op, Operation::Launch { .. })));

    scheduler.confirm_running();
    assert_eq!(handles.plan("recovery").unwrap().status, Status::Complete);
}

#[test]
fn permanent_failure_tears_down_and_re_reserves() {
    // A volume-backed task, so deployment reserves disk and creates the
    // volume.
    let spec = service(vec![pod(
        "a",
        0,
        vec![task_with_volume("t1", 1.0, 100.0, 1000)],
    )]);
    let mut scheduler = Scheduler::new(instant_config(), spec);
    let handles = scheduler.register();

    scheduler.offer(vec![offer(
        "o1",
        vec![
            Resource::scalar("cpus", 4.0),
            Resource::scalar("mem", 2000.0),
            Resource::scalar("disk", 8000.0),
        ],
    )]);
    let ops: Vec<String> = scheduler.driver.accepts()[0]
        .1
        .iter()
        .map(|op| op.to_string())
        .collect();
    assert_eq!(ops, vec!["RESERVE(1)", "CREATE(1)", "LAUNCH(1)"]);
    scheduler.confirm_running();

    // The task goes LOST past the permanence timeout (zero in this config):
    // recovery upgrades to a permanent step.
    let task_id = scheduler.driver.launched()[0].task_id.clone();
    scheduler.status(
        TaskStatus::new(task_id, TaskState::Lost)
            .with_target(scheduler.config_store.target().unwrap().unwrap()),
    );
    scheduler.driver.clear();

    // The stale reservation comes back in the next offer from its agent,
    // alongside fresh headroom.
    let record = scheduler.state_store.fetch_task("t1").unwrap().unwrap();
    let mut resources = vec![
        Resource::scalar("cpus", 4.0),
        Resource::scalar("mem", 2000.0),
        Resource::scalar("disk", 8000.0),
    ];
    resources.extend(
        record
            .info
            .resources
            .iter()
            .filter(|r| r.reservation.is_some())
            .cloned(),
    );
    scheduler.offer(vec![offer("o2", resources)]);

    let ops: Vec<String> = scheduler.driver.accepts()[0]
        .1
        .iter()
        .map(|op| op.to_string())
        .collect();
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

    scheduler.confirm_running();
    assert_eq!(handles.plan("recovery").unwrap().status, Status::Complete);
}

#[test]
fn replace_task_forces_permanent_recovery() {
    let spec = service(vec![pod(
        "a",
        0,
        vec![task_with_volume("t1", 1.0, 100.0, 1000)],
    )]);
    let mut scheduler = Scheduler::new(instant_config(), spec);
    let handles = scheduler.register();

    scheduler.offer(vec![offer(
        "o1",
        vec![
            Resource::scalar("cpus", 4.0),
            Resource::scalar("mem", 2000.0),
            Resource::scalar("disk", 8000.0),
        ],
    )]);
    scheduler.confirm_running();
    let task_id = scheduler.driver.launched()[0].task_id.clone();
    scheduler.driver.clear();

    // The operator replaces the task: the kill goes through the serial
    // queue, and the task is marked permanently failed.
    handles.replace_task("t1");
    scheduler.pump();
    assert_eq!(scheduler.driver.kills(), vec![task_id.clone()]);
    assert!(
        scheduler
            .state_store
            .fetch_task("t1")
            .unwrap()
            .unwrap()
            .permanently_failed
    );

    // The cluster confirms the kill; recovery now tears down and
    // re-reserves.
    scheduler.status(
        TaskStatus::new(task_id, TaskState::Killed)
            .with_target(scheduler.config_store.target().unwrap().unwrap()),
    );
    let record = scheduler.state_store.fetch_task("t1").unwrap().unwrap();
    let mut resources = vec![
        Resource::scalar("cpus", 4.0),
        Resource::scalar("mem", 2000.0),
        Resource::scalar("disk", 8000.0),
    ];
    resources.extend(
        record
            .info
            .resources
            .iter()
            .filter(|r| r.reservation.is_some())
            .cloned(),
    );
    scheduler.driver.clear();
    scheduler.offer(vec![offer("o2", resources)]);

    let ops: Vec<String> = scheduler.driver.accepts()[0]
        .1
        .iter()
        .map(|op| op.to_string())
        .collect();
    assert!(ops.contains(&"DESTROY(1)".to_string()));
    assert!(ops.contains(&"UNRESERVE(1)".to_string()));
    assert!(ops.contains(&"LAUNCH(1)".to_string()));
}

#[test]
fn leaked_reservations_are_cleaned_from_unused_offers() {
    let spec = service(vec![pod("a", 0, vec![task("t1", 1.0, 100.0)])]);
    let mut scheduler = Scheduler::new(instant_config(), spec);
    scheduler.register();

    scheduler.offer(vec![cpus_mem_offer("o1", 4.0, 2000.0)]);
    scheduler.confirm_running();
    scheduler.driver.clear();

    // An offer carrying a reservation no live task expects: the plans have
    // no use for it, so the cleaner releases it.
    let leaked = Resource {
        name: "cpus".to_string(),
        value: armada_spec::ResourceValue::Scalar(2.0),
        reservation: Some(armada_scheduler::offer::Reservation {
            role: "test-role".to_string(),
            principal: "test-principal".to_string(),
            resource_id: "res-forgotten".to_string(),
        }),
        disk: None,
    };
    scheduler.offer(vec![offer("o2", vec![leaked])]);

    let accepts = scheduler.driver.accepts();
    assert_eq!(accepts.len(), 1);
    assert!(matches!(accepts[0].1[0], Operation::Unreserve { .. }));
}
