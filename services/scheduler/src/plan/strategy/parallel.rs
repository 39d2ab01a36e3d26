//! Parallel strategies: every eligible child at once.

use super::{Interruptible, Status, Strategy};

/// Candidates are all eligible children. A child in ERROR freezes the
/// container until an operator intervenes.
#[derive(Debug, Default)]
pub struct ParallelStrategy {
    interrupts: Interruptible,
}

impl ParallelStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for ParallelStrategy {
    fn candidates(&self, statuses: &[Status]) -> Vec<usize> {
        if self.interrupts.is_interrupted() {
            return Vec::new();
        }
        if statuses.iter().any(|s| *s == Status::Error) {
            return Vec::new();
        }
        eligible(statuses)
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

/// Like [`ParallelStrategy`] but children in ERROR are skipped; the rest
/// keep working.
#[derive(Debug, Default)]
pub struct ParallelWithErrorsStrategy {
    interrupts: Interruptible,
}

impl ParallelWithErrorsStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for ParallelWithErrorsStrategy {
    fn candidates(&self, statuses: &[Status]) -> Vec<usize> {
        if self.interrupts.is_interrupted() {
            return Vec::new();
        }
        eligible(statuses)
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

fn eligible(statuses: &[Status]) -> Vec<usize> {
    statuses
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_eligible())
        .map(|(idx, _)| idx)
        .collect()
}
