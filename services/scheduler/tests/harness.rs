//! Shared test harness: a recording driver and spec/offer builders.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use armada_id::{AgentId, OfferId, TaskId};
use armada_scheduler::config::Config;
use armada_scheduler::driver::SchedulerDriver;
use armada_scheduler::engine::{event_channel, Engine, EventSender, SchedulerEvent};
use armada_scheduler::error::DriverError;
use armada_scheduler::offer::recommendation::Operation;
use armada_scheduler::offer::{Offer, Resource, TaskInfo};
use armada_scheduler::operator::OperatorHandles;
use armada_scheduler::state::{ConfigStore, InMemoryConfigStore, InMemoryStateStore, StateStore};
use armada_scheduler::task::{TaskState, TaskStatus};
use armada_spec::{
    GoalState, PodSpec, ResourceSpec, ServiceSpecification, TaskSpec, VolumeSpec,
};

/// One outbound driver call, as recorded.
#[derive(Debug, Clone)]
pub enum DriverCall {
    Accept {
        offer_id: OfferId,
        operations: Vec<Operation>,
    },
    Decline(OfferId),
    Kill(TaskId),
    Reconcile(Vec<TaskId>),
    Suppress,
    Revive,
}

/// Driver that records every call for later assertions.
#[derive(Debug, Default)]
pub struct MockDriver {
    calls: Mutex<Vec<DriverCall>>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn accepts(&self) -> Vec<(OfferId, Vec<Operation>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Accept {
                    offer_id,
                    operations,
                } => Some((offer_id, operations)),
                _ => None,
            })
            .collect()
    }

    pub fn declines(&self) -> Vec<OfferId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Decline(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn kills(&self) -> Vec<TaskId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Kill(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Task infos launched across all recorded accepts.
    pub fn launched(&self) -> Vec<TaskInfo> {
        self.accepts()
            .into_iter()
            .flat_map(|(_, ops)| ops)
            .filter_map(|op| match op {
                Operation::Launch { tasks } => Some(tasks),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn suppress_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Suppress))
            .count()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SchedulerDriver for MockDriver {
    fn accept_offers(
        &self,
        offer_id: &OfferId,
        operations: &[Operation],
    ) -> Result<(), DriverError> {
        self.record(DriverCall::Accept {
            offer_id: offer_id.clone(),
            operations: operations.to_vec(),
        });
        Ok(())
    }

    fn decline_offer(&self, offer_id: &OfferId) -> Result<(), DriverError> {
        self.record(DriverCall::Decline(offer_id.clone()));
        Ok(())
    }

    fn kill_task(&self, task_id: &TaskId) -> Result<(), DriverError> {
        self.record(DriverCall::Kill(task_id.clone()));
        Ok(())
    }

    fn reconcile_tasks(&self, task_ids: &[TaskId]) -> Result<(), DriverError> {
        self.record(DriverCall::Reconcile(task_ids.to_vec()));
        Ok(())
    }

    fn suppress_offers(&self) -> Result<(), DriverError> {
        self.record(DriverCall::Suppress);
        Ok(())
    }

    fn revive_offers(&self) -> Result<(), DriverError> {
        self.record(DriverCall::Revive);
        Ok(())
    }
}

/// A scheduler under test: engine plus everything needed to poke at it.
pub struct Scheduler {
    pub engine: Engine,
    pub driver: Arc<MockDriver>,
    pub state_store: Arc<InMemoryStateStore>,
    pub config_store: Arc<InMemoryConfigStore>,
    pub events: EventSender,
    pub queue: tokio::sync::mpsc::UnboundedReceiver<SchedulerEvent>,
    pub handles: tokio::sync::oneshot::Receiver<OperatorHandles>,
}

impl Scheduler {
    pub fn new(config: Config, spec: ServiceSpecification) -> Self {
        let state_store = Arc::new(InMemoryStateStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        Self::with_stores(config, spec, state_store, config_store)
    }

    /// Build a scheduler over pre-existing stores, as a restart would.
    pub fn with_stores(
        config: Config,
        spec: ServiceSpecification,
        state_store: Arc<InMemoryStateStore>,
        config_store: Arc<InMemoryConfigStore>,
    ) -> Self {
        let driver = MockDriver::new();
        let (ready_tx, handles) = tokio::sync::oneshot::channel();
        // Tests drive the engine synchronously through handle_event; the
        // queue only carries operator requests, drained with pump().
        let (events, queue) = event_channel();
        let engine = Engine::new(
            config,
            spec,
            state_store.clone() as Arc<dyn StateStore>,
            config_store.clone() as Arc<dyn ConfigStore>,
            driver.clone() as Arc<dyn SchedulerDriver>,
        )
        .with_ready_channel(ready_tx, events.clone());

        Self {
            engine,
            driver,
            state_store,
            config_store,
            events,
            queue,
            handles,
        }
    }

    /// Drain queued operator requests into the engine.
    pub fn pump(&mut self) {
        while let Ok(event) = self.queue.try_recv() {
            let fatal = self.engine.handle_event(event);
            assert!(fatal.is_none());
        }
    }

    pub fn register(&mut self) -> OperatorHandles {
        let fatal = self.engine.handle_event(SchedulerEvent::Registered {
            framework_id: armada_id::FrameworkId::parse("framework-test").unwrap(),
        });
        assert!(fatal.is_none(), "registration was fatal: {fatal:?}");
        self.handles.try_recv().expect("operator handles delivered")
    }

    pub fn offer(&mut self, offers: Vec<Offer>) {
        let fatal = self
            .engine
            .handle_event(SchedulerEvent::ResourceOffers(offers));
        assert!(fatal.is_none());
    }

    pub fn status(&mut self, status: TaskStatus) {
        let fatal = self.engine.handle_event(SchedulerEvent::StatusUpdate(status));
        assert!(fatal.is_none());
    }

    /// Report RUNNING (stamped with the task's launch target) for every task
    /// launched so far.
    pub fn confirm_running(&mut self) {
        for info in self.driver.launched() {
            let status = TaskStatus::new(info.task_id.clone(), TaskState::Running)
                .with_target(info.config_target.clone());
            self.status(status);
        }
    }
}

/// Zero-delay config so recovery paths run immediately in tests.
pub fn instant_config() -> Config {
    Config {
        permanent_failure_timeout: Some(std::time::Duration::ZERO),
        destructive_recovery_delay: std::time::Duration::ZERO,
        ..Config::default()
    }
}

pub fn task(name: &str, cpus: f64, mem: f64) -> TaskSpec {
    TaskSpec {
        name: name.to_string(),
        command: "./run".to_string(),
        goal: GoalState::Running,
        resources: vec![
            ResourceSpec::scalar("cpus", cpus),
            ResourceSpec::scalar("mem", mem),
        ],
        volumes: vec![],
        placement: None,
        health_check: None,
    }
}

pub fn task_with_volume(name: &str, cpus: f64, mem: f64, size_mb: u64) -> TaskSpec {
    let mut spec = task(name, cpus, mem);
    spec.volumes = vec![VolumeSpec {
        container_path: "data".to_string(),
        size_mb,
    }];
    spec
}

pub fn pod(pod_type: &str, index: u32, tasks: Vec<TaskSpec>) -> PodSpec {
    PodSpec {
        pod_type: pod_type.to_string(),
        user: None,
        index,
        tasks,
        resource_sets: vec![],
        placement: None,
    }
}

pub fn service(pods: Vec<PodSpec>) -> ServiceSpecification {
    ServiceSpecification {
        name: "test-svc".to_string(),
        principal: "test-principal".to_string(),
        role: "test-role".to_string(),
        pods,
    }
}

pub fn offer(id: &str, resources: Vec<Resource>) -> Offer {
    Offer {
        id: OfferId::parse(id).unwrap(),
        agent_id: AgentId::parse("agent-1").unwrap(),
        hostname: "host-1".to_string(),
        attributes: BTreeMap::new(),
        resources,
    }
}

pub fn cpus_mem_offer(id: &str, cpus: f64, mem: f64) -> Offer {
    offer(
        id,
        vec![Resource::scalar("cpus", cpus), Resource::scalar("mem", mem)],
    )
}
