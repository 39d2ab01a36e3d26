//! Configuration update handshake.
//!
//! On registration the submitted specification is compared against the
//! currently-targeted generation by content hash. An identical submission is
//! a no-op; a changed one is validated against the old generation, stored,
//! and targeted. Validation failures keep the old target and are surfaced to
//! the caller, which treats them as fatal at startup.

use std::sync::Arc;

use armada_spec::{ConfigTarget, ServiceSpecification, SpecValidator, ValidationError};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::state::ConfigStore;

/// Result of a configuration update attempt.
#[derive(Debug)]
pub struct UpdateResult {
    /// The target now in effect: the new generation on success, the previous
    /// one when validation rejected the change.
    pub target: ConfigTarget,

    /// Violations found by the validators; empty on success.
    pub errors: Vec<ValidationError>,
}

pub struct ConfigUpdater {
    config_store: Arc<dyn ConfigStore>,
    validators: Vec<Box<dyn SpecValidator>>,
}

impl ConfigUpdater {
    #[must_use]
    pub fn new(config_store: Arc<dyn ConfigStore>, validators: Vec<Box<dyn SpecValidator>>) -> Self {
        Self {
            config_store,
            validators,
        }
    }

    /// Run the update handshake for a submitted specification.
    pub fn update(&self, spec: &ServiceSpecification) -> Result<UpdateResult, StoreError> {
        let candidate = ConfigTarget::of(spec)?;

        let current_target = self.config_store.target()?;
        let current = match &current_target {
            Some(target) => Some(self.config_store.fetch(target)?),
            None => None,
        };

        if current_target.as_ref() == Some(&candidate) {
            info!(target = %candidate, "Configuration unchanged");
            return Ok(UpdateResult {
                target: candidate,
                errors: Vec::new(),
            });
        }

        let errors: Vec<ValidationError> = self
            .validators
            .iter()
            .flat_map(|v| v.validate(current.as_ref(), spec))
            .collect();

        if !errors.is_empty() {
            for error in &errors {
                warn!(error = %error, "Configuration change rejected");
            }
            // Keep the old generation in effect if there is one; a rejected
            // first install has nothing to fall back to.
            let target = match current_target {
                Some(target) => target,
                None => candidate,
            };
            return Ok(UpdateResult { target, errors });
        }

        let target = self.config_store.store(spec)?;
        self.config_store.set_target(&target)?;
        info!(target = %target, "Configuration updated");
        Ok(UpdateResult {
            target,
            errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use armada_spec::{
        GoalState, PodSpec, ResourceSpec, TaskSetsCannotShrink, TaskSpec, TaskVolumesCannotChange,
    };

    use super::*;
    use crate::state::InMemoryConfigStore;

    fn spec(task_names: &[&str]) -> ServiceSpecification {
        ServiceSpecification {
            name: "svc".to_string(),
            principal: "p".to_string(),
            role: "r".to_string(),
            pods: vec![PodSpec {
                pod_type: "node".to_string(),
                user: None,
                index: 0,
                tasks: task_names
                    .iter()
                    .map(|n| TaskSpec {
                        name: n.to_string(),
                        command: "./run".to_string(),
                        goal: GoalState::Running,
                        resources: vec![ResourceSpec::scalar("cpus", 1.0)],
                        volumes: vec![],
                        placement: None,
                        health_check: None,
                    })
                    .collect(),
                resource_sets: vec![],
                placement: None,
            }],
        }
    }

    fn updater(store: Arc<InMemoryConfigStore>) -> ConfigUpdater {
        ConfigUpdater::new(
            store,
            vec![
                Box::new(TaskSetsCannotShrink),
                Box::new(TaskVolumesCannotChange),
            ],
        )
    }

    #[test]
    fn test_first_install_targets_new_generation() {
        let store = Arc::new(InMemoryConfigStore::new());
        let result = updater(store.clone()).update(&spec(&["t1"])).unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(store.target().unwrap(), Some(result.target));
    }

    #[test]
    fn test_identical_submission_is_noop() {
        let store = Arc::new(InMemoryConfigStore::new());
        let updater = updater(store.clone());
        let first = updater.update(&spec(&["t1"])).unwrap();
        let second = updater.update(&spec(&["t1"])).unwrap();
        assert_eq!(first.target, second.target);
    }

    #[test]
    fn test_valid_change_retargets() {
        let store = Arc::new(InMemoryConfigStore::new());
        let updater = updater(store.clone());
        let first = updater.update(&spec(&["t1"])).unwrap();
        let second = updater.update(&spec(&["t1", "t2"])).unwrap();
        assert!(second.errors.is_empty());
        assert_ne!(first.target, second.target);
        assert_eq!(store.target().unwrap(), Some(second.target));
    }

    #[test]
    fn test_rejected_change_keeps_old_target() {
        let store = Arc::new(InMemoryConfigStore::new());
        let updater = updater(store.clone());
        let first = updater.update(&spec(&["t1", "t2"])).unwrap();
        let rejected = updater.update(&spec(&["t1"])).unwrap();
        assert!(!rejected.errors.is_empty());
        assert_eq!(rejected.target, first.target);
        assert_eq!(store.target().unwrap(), Some(first.target));
    }
}
