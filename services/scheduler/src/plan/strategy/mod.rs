//! Candidate-selection strategies.
//!
//! A strategy decides which children of a container are currently eligible
//! for work, given the children's statuses in order. All shipped strategies
//! compose an [`Interruptible`] flag: while interrupted, the candidate set is
//! empty and the container derives WAITING.

mod dependency;
mod parallel;
mod serial;

pub use dependency::DependencyStrategy;
pub use parallel::{ParallelStrategy, ParallelWithErrorsStrategy};
pub use serial::{SerialStrategy, SerialWithErrorsStrategy};

use std::sync::atomic::{AtomicBool, Ordering};

use super::Status;

/// Decides the candidate children of a container.
pub trait Strategy: Send + Sync {
    /// Positions of children currently eligible for work, in child order.
    /// Empty while interrupted.
    fn candidates(&self, statuses: &[Status]) -> Vec<usize>;

    /// Pause candidate selection. Idempotent.
    fn interrupt(&self);

    /// Resume candidate selection. Idempotent.
    fn proceed(&self);

    fn is_interrupted(&self) -> bool;
}

/// Shared interruption flag, composed into each strategy.
#[derive(Debug, Default)]
pub struct Interruptible {
    interrupted: AtomicBool,
}

impl Interruptible {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn proceed(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}
