//! Task IDs.
//!
//! A task ID is minted by the scheduler every time a task is (re)launched,
//! so each launch attempt is distinguishable in status updates. The owning
//! task name is embedded so it can be recovered from a bare ID:
//! `{name}__{ulid}`. Task names themselves must not contain `__`.

use ulid::Ulid;

use crate::IdError;

/// A task ID in the form `{name}__{ulid}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    name: String,
    ulid: Ulid,
}

/// Separator between the task name and the launch ULID.
const SEPARATOR: &str = "__";

impl TaskId {
    /// Mints a fresh ID for a launch of the named task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ulid: Ulid::new(),
        }
    }

    /// Parses a task ID from its `{name}__{ulid}` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        // The name may itself contain single underscores; split on the last
        // occurrence of the double-underscore separator.
        let Some(idx) = s.rfind(SEPARATOR) else {
            return Err(IdError::MissingTaskSeparator(s.to_string()));
        };

        let (name, rest) = s.split_at(idx);
        if name.is_empty() {
            return Err(IdError::EmptyTaskName);
        }

        let ulid = rest[SEPARATOR.len()..]
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            ulid,
        })
    }

    /// The task name this ID was minted for.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.name
    }

    /// The launch ULID portion.
    #[must_use]
    pub fn ulid(&self) -> Ulid {
        self.ulid
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.ulid)
    }
}

impl std::str::FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_roundtrip() {
        let id = TaskId::new("broker-0-node");
        let parsed = TaskId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(parsed.task_name(), "broker-0-node");
    }

    #[test]
    fn test_task_id_name_with_underscores() {
        let id = TaskId::new("data_node-1");
        let parsed = TaskId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed.task_name(), "data_node-1");
    }

    #[test]
    fn test_task_id_distinct_per_launch() {
        let a = TaskId::new("web-0");
        let b = TaskId::new("web-0");
        assert_ne!(a, b);
        assert_eq!(a.task_name(), b.task_name());
    }

    #[test]
    fn test_task_id_missing_separator() {
        assert!(matches!(
            TaskId::parse("web-0-01HV4Z2WQXKJNM8GPQY6VBKC3D").unwrap_err(),
            IdError::MissingTaskSeparator(_)
        ));
    }

    #[test]
    fn test_task_id_empty_name() {
        assert!(matches!(
            TaskId::parse("__01HV4Z2WQXKJNM8GPQY6VBKC3D").unwrap_err(),
            IdError::EmptyTaskName
        ));
    }

    #[test]
    fn test_task_id_json_roundtrip() {
        let id = TaskId::new("web-0");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
