//! Launch rate limiting for recovery.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// The two flavors of recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    /// Relaunch in place, reusing any existing reservations.
    Transient,

    /// The task is permanently lost: tear down its reservations and start
    /// over with fresh ones.
    Permanent,
}

/// Enforces one minimum delay between destructive (permanent) launches per
/// recovery manager. Transient relaunches are never delayed.
#[derive(Debug)]
pub struct TimedLaunchConstrainer {
    min_delay: Duration,
    last_destructive: Mutex<Option<Instant>>,
}

impl TimedLaunchConstrainer {
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_destructive: Mutex::new(None),
        }
    }

    /// Whether a launch of this kind may go out now.
    pub fn can_launch(&self, kind: RecoveryKind) -> bool {
        match kind {
            RecoveryKind::Transient => true,
            RecoveryKind::Permanent => {
                let last = match self.last_destructive.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                last.map(|at| at.elapsed() >= self.min_delay).unwrap_or(true)
            }
        }
    }

    /// Record that a launch of this kind was dispatched.
    pub fn launch_happened(&self, kind: RecoveryKind) {
        if kind == RecoveryKind::Permanent {
            let mut last = match self.last_destructive.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *last = Some(Instant::now());
        }
    }
}
