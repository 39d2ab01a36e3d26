//! State and configuration stores.
//!
//! Both stores are process-wide singletons created once and shared
//! read-mostly; writes happen only from the serial engine. Persistent
//! backends (a remote coordination service) are out of scope, so the traits
//! model the abstract key/value layout:
//!
//! - `/frameworkId`: single value
//! - `/tasks/<name>`: task info and last status per task
//! - `/config/target`: pointer to the current config target
//! - `/config/<id>`: serialized service specification
//! - `/suppressed`: boolean

use std::collections::HashMap;
use std::sync::RwLock;

use armada_id::FrameworkId;
use armada_spec::{ConfigTarget, ServiceSpecification};

use crate::error::StoreError;
use crate::offer::TaskInfo;
use crate::task::TaskStatus;

/// One task as the framework knows it: the info it was launched with, the
/// last status observed, and whether it has been declared permanently failed.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub info: TaskInfo,
    pub status: Option<TaskStatus>,
    pub permanently_failed: bool,
}

/// Framework state storage.
pub trait StateStore: Send + Sync {
    fn store_framework_id(&self, id: &FrameworkId) -> Result<(), StoreError>;
    fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StoreError>;

    /// Store (or replace) a task's launch info, resetting its status.
    fn store_task(&self, info: &TaskInfo) -> Result<(), StoreError>;

    /// Store the latest status for the task the status's ID names.
    ///
    /// A status for an unknown task is an error; the caller decides whether
    /// that is fatal (it never is in steady state).
    fn store_status(&self, status: &TaskStatus) -> Result<(), StoreError>;

    fn fetch_task(&self, name: &str) -> Result<Option<TaskRecord>, StoreError>;
    fn fetch_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Mark a task permanently failed so recovery tears down its
    /// reservations instead of relaunching in place.
    fn mark_permanently_failed(&self, name: &str) -> Result<(), StoreError>;

    /// Remove a task entirely (after its resources are cleaned).
    fn remove_task(&self, name: &str) -> Result<(), StoreError>;

    fn set_suppressed(&self, suppressed: bool) -> Result<(), StoreError>;
    fn is_suppressed(&self) -> Result<bool, StoreError>;
}

/// Configuration storage: immutable specification generations addressed by
/// content hash, plus the target pointer.
pub trait ConfigStore: Send + Sync {
    /// Store a specification generation, returning its target.
    fn store(&self, spec: &ServiceSpecification) -> Result<ConfigTarget, StoreError>;

    /// Fetch a stored generation.
    fn fetch(&self, target: &ConfigTarget) -> Result<ServiceSpecification, StoreError>;

    /// Point the service at a stored generation.
    fn set_target(&self, target: &ConfigTarget) -> Result<(), StoreError>;

    /// The currently targeted generation, if any.
    fn target(&self) -> Result<Option<ConfigTarget>, StoreError>;
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    inner: RwLock<StateInner>,
}

#[derive(Debug, Default)]
struct StateInner {
    framework_id: Option<FrameworkId>,
    tasks: HashMap<String, TaskRecord>,
    suppressed: bool,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn store_framework_id(&self, id: &FrameworkId) -> Result<(), StoreError> {
        self.write()?.framework_id = Some(id.clone());
        Ok(())
    }

    fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StoreError> {
        Ok(self.read()?.framework_id.clone())
    }

    fn store_task(&self, info: &TaskInfo) -> Result<(), StoreError> {
        self.write()?.tasks.insert(
            info.name.clone(),
            TaskRecord {
                info: info.clone(),
                status: None,
                permanently_failed: false,
            },
        );
        Ok(())
    }

    fn store_status(&self, status: &TaskStatus) -> Result<(), StoreError> {
        let name = status.task_id.task_name().to_string();
        let mut inner = self.write()?;
        let record = inner
            .tasks
            .get_mut(&name)
            .ok_or_else(|| StoreError::Backend(format!("no such task: {name}")))?;
        record.status = Some(status.clone());
        Ok(())
    }

    fn fetch_task(&self, name: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.read()?.tasks.get(name).cloned())
    }

    fn fetch_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let inner = self.read()?;
        let mut records: Vec<TaskRecord> = inner.tasks.values().cloned().collect();
        records.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        Ok(records)
    }

    fn mark_permanently_failed(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let record = inner
            .tasks
            .get_mut(name)
            .ok_or_else(|| StoreError::Backend(format!("no such task: {name}")))?;
        record.permanently_failed = true;
        Ok(())
    }

    fn remove_task(&self, name: &str) -> Result<(), StoreError> {
        self.write()?.tasks.remove(name);
        Ok(())
    }

    fn set_suppressed(&self, suppressed: bool) -> Result<(), StoreError> {
        self.write()?.suppressed = suppressed;
        Ok(())
    }

    fn is_suppressed(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.suppressed)
    }
}

impl InMemoryStateStore {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StateInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("state store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StateInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("state store lock poisoned".to_string()))
    }
}

/// In-memory config store.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    inner: RwLock<ConfigInner>,
}

#[derive(Debug, Default)]
struct ConfigInner {
    configs: HashMap<String, serde_json::Value>,
    target: Option<ConfigTarget>,
}

impl InMemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, ConfigInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("config store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, ConfigInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("config store lock poisoned".to_string()))
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn store(&self, spec: &ServiceSpecification) -> Result<ConfigTarget, StoreError> {
        let value = serde_json::to_value(spec)?;
        let target = ConfigTarget::from_json(&value);
        self.write()?
            .configs
            .insert(target.as_str().to_string(), value);
        Ok(target)
    }

    fn fetch(&self, target: &ConfigTarget) -> Result<ServiceSpecification, StoreError> {
        let inner = self.read()?;
        let value = inner
            .configs
            .get(target.as_str())
            .ok_or_else(|| StoreError::UnknownTarget(target.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    fn set_target(&self, target: &ConfigTarget) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if !inner.configs.contains_key(target.as_str()) {
            return Err(StoreError::UnknownTarget(target.to_string()));
        }
        inner.target = Some(target.clone());
        Ok(())
    }

    fn target(&self) -> Result<Option<ConfigTarget>, StoreError> {
        Ok(self.read()?.target.clone())
    }
}
