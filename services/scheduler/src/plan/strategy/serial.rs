//! Serial strategies: one child at a time, in declared order.

use super::{Interruptible, Status, Strategy};

/// Candidates are the first non-complete child, and only while it is
/// eligible. A child in ERROR blocks the rollout until an operator
/// intervenes.
#[derive(Debug, Default)]
pub struct SerialStrategy {
    interrupts: Interruptible,
}

impl SerialStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for SerialStrategy {
    fn candidates(&self, statuses: &[Status]) -> Vec<usize> {
        if self.interrupts.is_interrupted() {
            return Vec::new();
        }
        serial_candidate(statuses, false)
    }

    fn interrupt(&self) {
        self.interrupts.interrupt();
    }

    fn proceed(&self) {
        self.interrupts.proceed();
    }

    fn is_interrupted(&self) -> bool {
        self.interrupts.is_interrupted()
    }
}

/// Like [`SerialStrategy`] but skips children in ERROR instead of blocking
/// behind them.
#[derive(Debug, Default)]
pub struct SerialWithErrorsStrategy {
    interrupts: Interruptible,
}

impl SerialWithErrorsStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for SerialWithErrorsStrategy {
    fn candidates(&self, statuses: &[Status]) -> Vec<usize> {
        if self.interrupts.is_interrupted() {
            return Vec::new();
        }
        serial_candidate(statuses, true)
    }

    fn interrupt(&self) {
        self.interrupts.interrupt();
    }

    fn proceed(&self) {
        self.interrupts.proceed();
    }

    fn is_interrupted(&self) -> bool {
        self.interrupts.is_interrupted()
    }
}

fn serial_candidate(statuses: &[Status], skip_errors: bool) -> Vec<usize> {
    for (idx, status) in statuses.iter().enumerate() {
        if *status == Status::Complete {
            continue;
        }
        if skip_errors && *status == Status::Error {
            continue;
        }
        // First child still owed work: a candidate only if eligible. A child
        // that is starting (or errored, in the strict variant) holds the line.
        return if status.is_eligible() { vec![idx] } else { Vec::new() };
    }
    Vec::new()
}
