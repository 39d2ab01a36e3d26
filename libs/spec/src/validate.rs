//! Configuration validation.
//!
//! When a new specification generation is submitted, it is validated against
//! the previously-targeted generation. Validation failures block the update;
//! the scheduler treats them as fatal at startup.

use thiserror::Error;

use crate::service::{task_counts, ServiceSpecification};

/// A rejected configuration change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task set '{pod_type}' shrank from {old} to {new} tasks")]
    TaskSetShrank {
        pod_type: String,
        old: usize,
        new: usize,
    },

    #[error("task set '{pod_type}' was removed")]
    TaskSetRemoved { pod_type: String },

    #[error("volumes changed for task '{task}'")]
    VolumesChanged { task: String },
}

/// A structural rule a new specification generation must satisfy relative to
/// the previous one.
pub trait SpecValidator: Send + Sync {
    /// Returns all violations; an empty list means the change is acceptable.
    fn validate(
        &self,
        old: Option<&ServiceSpecification>,
        new: &ServiceSpecification,
    ) -> Vec<ValidationError>;
}

/// Each pod type's task count must stay the same or grow; pod types cannot
/// disappear. Shrinking would orphan reserved resources.
pub struct TaskSetsCannotShrink;

impl SpecValidator for TaskSetsCannotShrink {
    fn validate(
        &self,
        old: Option<&ServiceSpecification>,
        new: &ServiceSpecification,
    ) -> Vec<ValidationError> {
        let Some(old) = old else {
            return Vec::new();
        };

        let old_counts = task_counts(old);
        let new_counts = task_counts(new);

        let mut errors = Vec::new();
        for (pod_type, old_count) in old_counts {
            match new_counts.get(pod_type) {
                None => errors.push(ValidationError::TaskSetRemoved {
                    pod_type: pod_type.to_string(),
                }),
                Some(&new_count) if new_count < old_count => {
                    errors.push(ValidationError::TaskSetShrank {
                        pod_type: pod_type.to_string(),
                        old: old_count,
                        new: new_count,
                    });
                }
                Some(_) => {}
            }
        }
        errors
    }
}

/// Volume requirements of an existing task cannot change: the persisted data
/// on the old volume would be stranded.
pub struct TaskVolumesCannotChange;

impl SpecValidator for TaskVolumesCannotChange {
    fn validate(
        &self,
        old: Option<&ServiceSpecification>,
        new: &ServiceSpecification,
    ) -> Vec<ValidationError> {
        let Some(old) = old else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        for (_, old_task) in old.tasks() {
            if let Some((_, new_task)) = new.task(&old_task.name) {
                if old_task.volumes != new_task.volumes {
                    errors.push(ValidationError::VolumesChanged {
                        task: old_task.name.clone(),
                    });
                }
            }
        }
        errors
    }
}
