//! Task status updates.
//!
//! Statuses arrive asynchronously from the cluster manager. The wire format
//! is the driver's concern; internally a status is a plain record so the plan
//! graph and tests never touch a wire dependency.

use armada_id::{AgentId, TaskId};
use armada_spec::{ConfigTarget, GoalState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The cluster's view of one task's run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted by the agent, resources not yet allocated.
    Staging,

    /// Executor is bringing the task up.
    Starting,

    /// Task is running.
    Running,

    /// Task exited with success.
    Finished,

    /// Task exited with failure.
    Failed,

    /// Task was killed on request.
    Killed,

    /// The cluster no longer knows about the task.
    Lost,

    /// The task description was invalid.
    Error,
}

impl TaskState {
    /// Whether this state is terminal: the task will never run again under
    /// this task ID.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished
                | TaskState::Failed
                | TaskState::Killed
                | TaskState::Lost
                | TaskState::Error
        )
    }

    /// Whether a task observed in this state needs to be relaunched, given
    /// its goal state. A one-shot task that FINISHED reached its goal; a
    /// service task that FINISHED did not.
    #[must_use]
    pub fn needs_recovery(self, goal: GoalState) -> bool {
        match self {
            TaskState::Failed | TaskState::Killed | TaskState::Lost | TaskState::Error => true,
            TaskState::Finished => goal == GoalState::Running,
            TaskState::Staging | TaskState::Starting | TaskState::Running => false,
        }
    }

    /// Whether this state satisfies the given goal.
    #[must_use]
    pub fn reached_goal(self, goal: GoalState) -> bool {
        match goal {
            GoalState::Running => self == TaskState::Running,
            GoalState::Finished => self == TaskState::Finished,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Staging => "staging",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
            TaskState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// An asynchronous task state update from the cluster manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The launch this status refers to.
    pub task_id: TaskId,

    /// Reported run state.
    pub state: TaskState,

    /// Free-form reason from the agent or master.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Agent the task runs (or ran) on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,

    /// Config target the task was launched against, recovered from task
    /// labels at the driver boundary. Absent for tasks launched by older
    /// scheduler versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_target: Option<ConfigTarget>,

    /// When the cluster generated the update.
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    /// Build a status with the current time, for tests and synthetic updates.
    #[must_use]
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            agent_id: None,
            config_target: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the config target the task was launched against.
    #[must_use]
    pub fn with_target(mut self, target: ConfigTarget) -> Self {
        self.config_target = Some(target);
        self
    }
}
