//! Process exit codes and engine-level errors.

use thiserror::Error;

/// Exit codes for the scheduler process.
///
/// The engine never terminates the process itself; fatal paths resolve to one
/// of these codes, which the supervisor in `main` turns into an actual exit.
/// Codes are assigned in declaration order and must stay stable: operators
/// alert on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SchedulerErrorCode {
    /// Clean shutdown (event source closed).
    Normal = 0,

    /// Configuration update or plan construction failed at startup.
    InitializationFailure = 1,

    /// The framework ID could not be persisted after registration.
    RegistrationFailure = 2,

    /// The cluster manager re-registered an already-registered framework.
    ReRegistration = 3,

    /// An offer was rescinded and the rescind policy is to exit.
    OfferRescinded = 4,

    /// The driver lost its connection to the cluster manager.
    Disconnected = 5,

    /// The driver reported a fatal framework error.
    Error = 6,
}

impl SchedulerErrorCode {
    /// The numeric process exit code.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors surfaced by the outbound driver.
///
/// Driver sends are authoritative once issued; a send failure in steady state
/// is logged and the cluster manager's retry machinery is relied upon.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver call failed: {0}")]
    Send(String),

    #[error("driver is not connected")]
    NotConnected,
}

/// Errors from the state and config stores (the coordination service).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("unknown config target: {0}")]
    UnknownTarget(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
