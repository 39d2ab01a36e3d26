//! The serial scheduler engine.
//!
//! All mutating work happens on one logical thread: driver callbacks are
//! converted into typed [`SchedulerEvent`]s and queued; the engine consumes
//! the queue one event at a time. This is what makes the plan graph and the
//! reconciler safe without per-object locking discipline leaking everywhere.
//!
//! The engine never terminates the process. Fatal paths resolve to a
//! [`SchedulerErrorCode`] returned from [`Engine::run`]; the supervisor in
//! `main` consumes it and exits.

use std::sync::Arc;

use armada_id::{AgentId, ExecutorId, FrameworkId, OfferId};
use armada_spec::{ServiceSpecification, TaskSetsCannotShrink, TaskVolumesCannotChange};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::cleanup::{ResourceCleaner, ResourceCleanerScheduler};
use crate::config::Config;
use crate::driver::SchedulerDriver;
use crate::error::SchedulerErrorCode;
use crate::kill::TaskKiller;
use crate::offer::accepter::{LaunchRecorder, OfferAccepter};
use crate::offer::evaluator::OfferEvaluator;
use crate::offer::{filter_out_accepted, Offer};
use crate::operator::OperatorHandles;
use crate::plan::coordinator::PlanCoordinator;
use crate::plan::manager::{DeploymentPlanManager, PlanManager};
use crate::plan::plan::Plan;
use crate::plan::scheduler::PlanScheduler;
use crate::recovery::constrain::TimedLaunchConstrainer;
use crate::recovery::monitor::{FailureMonitor, NeverFailureMonitor, TimedFailureMonitor};
use crate::recovery::RecoveryPlanManager;
use crate::reconcile::Reconciler;
use crate::state::{ConfigStore, StateStore};
use crate::task::TaskStatus;
use crate::update::ConfigUpdater;

/// Marker the cluster manager puts in its error message when the framework
/// ID we re-registered with has been torn down.
const FRAMEWORK_REMOVED_MARKER: &str = "Framework has been removed";

/// Inbound driver callbacks, as queued messages.
#[derive(Debug)]
pub enum SchedulerEvent {
    Registered { framework_id: FrameworkId },
    Reregistered,
    ResourceOffers(Vec<Offer>),
    OfferRescinded(OfferId),
    StatusUpdate(TaskStatus),
    FrameworkMessage {
        executor_id: ExecutorId,
        agent_id: AgentId,
        data: Vec<u8>,
    },
    AgentLost(AgentId),
    ExecutorLost {
        executor_id: ExecutorId,
        agent_id: AgentId,
        status: i32,
    },
    Disconnected,
    Error(String),

    /// Operator request: kill a task so it relaunches. Destructive kills
    /// additionally mark the task permanently failed, forcing recovery to
    /// re-reserve. Queued so that only the serial engine touches the driver.
    KillTask { task_name: String, destructive: bool },
}

/// Cloneable handle the driver boundary uses to enqueue events.
#[derive(Clone)]
pub struct EventSender(mpsc::UnboundedSender<SchedulerEvent>);

impl EventSender {
    pub fn registered(&self, framework_id: FrameworkId) {
        self.send(SchedulerEvent::Registered { framework_id });
    }

    pub fn reregistered(&self) {
        self.send(SchedulerEvent::Reregistered);
    }

    pub fn resource_offers(&self, offers: Vec<Offer>) {
        self.send(SchedulerEvent::ResourceOffers(offers));
    }

    pub fn offer_rescinded(&self, offer_id: OfferId) {
        self.send(SchedulerEvent::OfferRescinded(offer_id));
    }

    pub fn status_update(&self, status: TaskStatus) {
        self.send(SchedulerEvent::StatusUpdate(status));
    }

    pub fn disconnected(&self) {
        self.send(SchedulerEvent::Disconnected);
    }

    pub fn error(&self, message: String) {
        self.send(SchedulerEvent::Error(message));
    }

    pub fn kill_task(&self, task_name: String, destructive: bool) {
        self.send(SchedulerEvent::KillTask {
            task_name,
            destructive,
        });
    }

    fn send(&self, event: SchedulerEvent) {
        // The engine shutting down mid-callback is not the driver's problem.
        let _ = self.0.send(event);
    }
}

/// Create the event queue: a sender for the driver boundary and the receiver
/// the engine consumes.
#[must_use]
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<SchedulerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

/// Everything built at registration time, once config and stores are safe to
/// touch.
struct EngineCore {
    coordinator: Arc<PlanCoordinator>,
    reconciler: Arc<Reconciler>,
    cleaner: ResourceCleanerScheduler,
    killer: TaskKiller,
}

pub struct Engine {
    config: Config,
    spec: ServiceSpecification,
    state_store: Arc<dyn StateStore>,
    config_store: Arc<dyn ConfigStore>,
    driver: Arc<dyn SchedulerDriver>,
    ready_tx: Option<(oneshot::Sender<OperatorHandles>, EventSender)>,
    core: Option<EngineCore>,
}

impl Engine {
    #[must_use]
    pub fn new(
        config: Config,
        spec: ServiceSpecification,
        state_store: Arc<dyn StateStore>,
        config_store: Arc<dyn ConfigStore>,
        driver: Arc<dyn SchedulerDriver>,
    ) -> Self {
        Self {
            config,
            spec,
            state_store,
            config_store,
            driver,
            ready_tx: None,
            core: None,
        }
    }

    /// Arrange for operator handles to be delivered once the engine has
    /// initialized (the one-slot readiness handshake). The event sender is
    /// embedded in the handles so operator task kills go through the serial
    /// queue rather than touching the driver directly.
    #[must_use]
    pub fn with_ready_channel(
        mut self,
        ready_tx: oneshot::Sender<OperatorHandles>,
        events: EventSender,
    ) -> Self {
        self.ready_tx = Some((ready_tx, events));
        self
    }

    /// Consume events until the queue closes or a fatal error occurs.
    ///
    /// Also watches the coordinator's change notifications: operator
    /// interrupts and proceeds land outside the event queue, and each one
    /// may flip whether offers should be suppressed.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SchedulerEvent>,
    ) -> SchedulerErrorCode {
        let mut changes: Option<tokio::sync::watch::Receiver<crate::plan::coordinator::CoordinatorState>> =
            None;

        loop {
            if changes.is_none() {
                changes = self.core.as_ref().map(|core| core.coordinator.subscribe());
            }

            let mut watch_closed = false;
            match changes.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(event) => {
                                if let Some(code) = self.handle_event(event) {
                                    return code;
                                }
                            }
                            None => break,
                        },
                        changed = rx.changed() => match changed {
                            Ok(()) => self.suppress_or_revive(),
                            Err(_) => watch_closed = true,
                        },
                    }
                }
                None => match events.recv().await {
                    Some(event) => {
                        if let Some(code) = self.handle_event(event) {
                            return code;
                        }
                    }
                    None => break,
                },
            }
            if watch_closed {
                warn!("Coordinator notification channel closed");
                break;
            }
        }
        info!("Event queue closed; shutting down");
        SchedulerErrorCode::Normal
    }

    /// Process one event. Returns a code when the event is fatal.
    pub fn handle_event(&mut self, event: SchedulerEvent) -> Option<SchedulerErrorCode> {
        match event {
            SchedulerEvent::Registered { framework_id } => self.handle_registered(framework_id),
            SchedulerEvent::Reregistered => {
                error!("Re-registration implies the framework was unregistered");
                if self.config.exit_on_reregister {
                    return Some(SchedulerErrorCode::ReRegistration);
                }
                None
            }
            SchedulerEvent::ResourceOffers(offers) => {
                self.handle_offers(offers);
                None
            }
            SchedulerEvent::OfferRescinded(offer_id) => {
                if self.config.exit_on_rescind {
                    error!(offer_id = %offer_id, "Offer rescinded; rescind handling is not supported");
                    return Some(SchedulerErrorCode::OfferRescinded);
                }
                // Offers are dispatched synchronously per batch, so there is
                // no cached offer to drop.
                warn!(offer_id = %offer_id, "Offer rescinded");
                None
            }
            SchedulerEvent::StatusUpdate(status) => {
                self.handle_status(status);
                None
            }
            SchedulerEvent::FrameworkMessage {
                executor_id,
                agent_id,
                data,
            } => {
                warn!(
                    executor_id = %executor_id,
                    agent_id = %agent_id,
                    bytes = data.len(),
                    "Received a framework message; don't know how to process it"
                );
                None
            }
            SchedulerEvent::AgentLost(agent_id) => {
                warn!(agent_id = %agent_id, "Agent lost; task statuses will drive recovery");
                None
            }
            SchedulerEvent::ExecutorLost {
                executor_id,
                agent_id,
                status,
            } => {
                warn!(
                    executor_id = %executor_id,
                    agent_id = %agent_id,
                    status,
                    "Executor lost; task statuses will drive recovery"
                );
                None
            }
            SchedulerEvent::Disconnected => {
                error!("Disconnected from the cluster manager");
                Some(SchedulerErrorCode::Disconnected)
            }
            SchedulerEvent::Error(message) => {
                error!(message = %message, "Driver reported a fatal error");
                if message.contains(FRAMEWORK_REMOVED_MARKER) {
                    error!(
                        "This usually means state from a previous install of the service \
                         was not cleaned up. Uninstall the service, delete its stored \
                         framework state and reserved resources, then install again."
                    );
                }
                Some(SchedulerErrorCode::Error)
            }
            SchedulerEvent::KillTask {
                task_name,
                destructive,
            } => {
                self.handle_kill(&task_name, destructive);
                None
            }
        }
    }

    fn handle_kill(&mut self, task_name: &str, destructive: bool) {
        let Some(core) = &self.core else {
            warn!(task = %task_name, "Kill request before registration; dropping");
            return;
        };
        match self.state_store.fetch_task(task_name) {
            Ok(Some(record)) => {
                core.killer
                    .kill(self.driver.as_ref(), &record.info.task_id, destructive);
            }
            Ok(None) => warn!(task = %task_name, "Kill requested for unknown task"),
            Err(e) => warn!(task = %task_name, error = %e, "Kill request failed to load task"),
        }
    }

    fn handle_registered(&mut self, framework_id: FrameworkId) -> Option<SchedulerErrorCode> {
        info!(framework_id = %framework_id, "Registered with cluster manager");

        // Nothing may be written to the stores before registration; this is
        // the first point where the config update is safe.
        let updater = ConfigUpdater::new(
            self.config_store.clone(),
            vec![
                Box::new(TaskSetsCannotShrink),
                Box::new(TaskVolumesCannotChange),
            ],
        );
        let update = match updater.update(&self.spec) {
            Ok(update) => update,
            Err(e) => {
                error!(error = %e, "Configuration update failed; exiting");
                return Some(SchedulerErrorCode::InitializationFailure);
            }
        };
        if !update.errors.is_empty() {
            error!(
                errors = update.errors.len(),
                "Configuration was rejected by validation; exiting"
            );
            return Some(SchedulerErrorCode::InitializationFailure);
        }

        // Deploy whatever generation is actually targeted.
        let spec = match self.config_store.fetch(&update.target) {
            Ok(spec) => spec,
            Err(e) => {
                error!(error = %e, "Cannot load targeted configuration; exiting");
                return Some(SchedulerErrorCode::InitializationFailure);
            }
        };

        info!("Building deployment and recovery plans");
        let deployment = DeploymentPlanManager::new(Plan::deployment(
            &spec,
            &update.target,
            &self.state_store,
        ));

        let monitor: Box<dyn FailureMonitor> = match self.config.permanent_failure_timeout {
            Some(timeout) => Box::new(TimedFailureMonitor::new(timeout)),
            None => Box::new(NeverFailureMonitor),
        };
        let recovery = RecoveryPlanManager::new(
            self.state_store.clone(),
            self.config_store.clone(),
            TimedLaunchConstrainer::new(self.config.destructive_recovery_delay),
            monitor,
        );

        let plan_scheduler = PlanScheduler::new(
            OfferEvaluator::new(),
            OfferAccepter::new(vec![Arc::new(LaunchRecorder::new(self.state_store.clone()))]),
            TaskKiller::new(self.state_store.clone()),
        );
        let managers: Vec<Arc<dyn PlanManager>> = vec![Arc::new(deployment), Arc::new(recovery)];
        let coordinator = Arc::new(PlanCoordinator::new(managers, plan_scheduler));

        if let Err(e) = self.state_store.store_framework_id(&framework_id) {
            error!(framework_id = %framework_id, error = %e, "Unable to store framework ID");
            return Some(SchedulerErrorCode::RegistrationFailure);
        }

        let reconciler = Arc::new(Reconciler::new(self.state_store.clone()));
        reconciler.start();
        reconciler.reconcile(self.driver.as_ref());

        let cleaner = ResourceCleanerScheduler::new(
            ResourceCleaner::new(self.state_store.clone()),
            OfferAccepter::new(vec![]),
        );

        self.core = Some(EngineCore {
            coordinator: coordinator.clone(),
            reconciler,
            cleaner,
            killer: TaskKiller::new(self.state_store.clone()),
        });

        if let Some((ready_tx, events)) = self.ready_tx.take() {
            let handles = OperatorHandles::new(coordinator, self.state_store.clone(), events);
            let _ = ready_tx.send(handles);
        }

        self.suppress_or_revive();
        info!("Initialization complete");
        None
    }

    fn handle_offers(&mut self, offers: Vec<Offer>) {
        let Some(core) = &self.core else {
            warn!(offers = offers.len(), "Offers before registration; declining");
            self.decline_all(&offers);
            return;
        };

        info!(offers = offers.len(), "Processing offer batch");

        // Reconciliation gate: until the cluster has confirmed every known
        // task, launching anything risks duplicating a live task.
        core.reconciler.reconcile(self.driver.as_ref());
        if !core.reconciler.is_reconciled() {
            info!("Reconciliation still in progress; declining offers");
            self.decline_all(&offers);
            return;
        }

        let accepted = core
            .coordinator
            .process_offers(self.driver.as_ref(), &offers);
        let mut unused = filter_out_accepted(offers, &accepted);

        // Whatever the plans did not use is scanned for leaked reservations.
        let cleaned = core.cleaner.resource_offers(self.driver.as_ref(), &unused);
        unused = filter_out_accepted(unused, &cleaned);

        self.decline_all(&unused);
        self.suppress_or_revive();
    }

    fn handle_status(&mut self, status: TaskStatus) {
        info!(
            task_id = %status.task_id,
            state = %status.state,
            message = status.message.as_deref().unwrap_or(""),
            "Received status update"
        );

        let Some(core) = &self.core else {
            warn!(task_id = %status.task_id, "Status before registration; dropping");
            return;
        };

        if let Err(e) = self.state_store.store_status(&status) {
            // Possibly a stale update for a task this scheduler no longer
            // tracks; the cluster will re-send anything that matters.
            warn!(task_id = %status.task_id, error = %e, "Failed to store status; dropping");
            return;
        }

        core.reconciler.update(&status);
        core.coordinator.update(&status);

        self.suppress_or_revive();
    }

    fn decline_all(&self, offers: &[Offer]) {
        for offer in offers {
            info!(offer_id = %offer.id, "Declining offer");
            if let Err(e) = self.driver.decline_offer(&offer.id) {
                warn!(offer_id = %offer.id, error = %e, "Decline failed");
            }
        }
    }

    /// Revive offer delivery while any plan has work; suppress it otherwise.
    /// The suppressed flag is mirrored to the state store so a restarted
    /// scheduler knows to revive.
    fn suppress_or_revive(&self) {
        let Some(core) = &self.core else {
            return;
        };
        if core.coordinator.has_operations() {
            info!("Reviving offers");
            if let Err(e) = self.driver.revive_offers() {
                warn!(error = %e, "Revive failed");
                return;
            }
            if let Err(e) = self.state_store.set_suppressed(false) {
                warn!(error = %e, "Failed to persist suppressed flag");
            }
        } else {
            info!("Suppressing offers");
            if let Err(e) = self.driver.suppress_offers() {
                warn!(error = %e, "Suppress failed");
                return;
            }
            if let Err(e) = self.state_store.set_suppressed(true) {
                warn!(error = %e, "Failed to persist suppressed flag");
            }
        }
    }
}
