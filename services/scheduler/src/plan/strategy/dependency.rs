//! Dependency strategy: children gated on declared predecessors.

use super::{Interruptible, Status, Strategy};

/// Candidates are eligible children whose declared predecessors are all
/// COMPLETE. Children without predecessors are gated on nothing.
#[derive(Debug)]
pub struct DependencyStrategy {
    /// `predecessors[i]` lists the child positions that must complete before
    /// child `i` may start.
    predecessors: Vec<Vec<usize>>,
    interrupts: Interruptible,
}

impl DependencyStrategy {
    #[must_use]
    pub fn new(predecessors: Vec<Vec<usize>>) -> Self {
        Self {
            predecessors,
            interrupts: Interruptible::new(),
        }
    }
}

impl Strategy for DependencyStrategy {
    fn candidates(&self, statuses: &[Status]) -> Vec<usize> {
        if self.interrupts.is_interrupted() {
            return Vec::new();
        }
        statuses
            .iter()
            .enumerate()
            .filter(|(idx, s)| {
                s.is_eligible()
                    && self
                        .predecessors
                        .get(*idx)
                        .map(|preds| {
                            preds
                                .iter()
                                .all(|p| statuses.get(*p) == Some(&Status::Complete))
                        })
                        .unwrap_or(true)
            })
            .map(|(idx, _)| idx)
            .collect()
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
