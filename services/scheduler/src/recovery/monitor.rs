//! Failure permanence monitors.
//!
//! A failure monitor decides when a failed task stops being a transient
//! casualty and is declared permanently lost, at which point recovery tears
//! down its reservations and starts fresh.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::state::TaskRecord;

/// Declares failed tasks permanently lost (or not).
pub trait FailureMonitor: Send + Sync {
    /// Whether the task's failure should now be treated as permanent.
    fn has_failed(&self, record: &TaskRecord) -> bool;
}

/// Never declares permanence; every failure stays transient. Used when
/// permanent failure detection is disabled.
#[derive(Debug, Default)]
pub struct NeverFailureMonitor;

impl FailureMonitor for NeverFailureMonitor {
    fn has_failed(&self, _record: &TaskRecord) -> bool {
        false
    }
}

/// Declares a failure permanent once the task has been continuously failed
/// for the configured timeout.
#[derive(Debug)]
pub struct TimedFailureMonitor {
    timeout: Duration,
    first_seen: Mutex<HashMap<String, Instant>>,
}

impl TimedFailureMonitor {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            first_seen: Mutex::new(HashMap::new()),
        }
    }
}

impl FailureMonitor for TimedFailureMonitor {
    fn has_failed(&self, record: &TaskRecord) -> bool {
        let mut first_seen = match self.first_seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let failed_now = record
            .status
            .as_ref()
            .is_some_and(|s| s.state.is_terminal());
        if !failed_now {
            // A healthy observation resets the clock.
            first_seen.remove(&record.info.name);
            return false;
        }

        let first = first_seen
            .entry(record.info.name.clone())
            .or_insert_with(Instant::now);
        first.elapsed() >= self.timeout
    }
}
