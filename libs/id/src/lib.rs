//! # armada-id
//!
//! Typed identifiers for the armada scheduler.
//!
//! ## Design Principles
//!
//! - IDs generated by the scheduler (plans, phases, steps, tasks) are
//!   ULID-based for sortability and uniqueness
//! - IDs assigned by the cluster manager (offers, agents, the framework
//!   itself) are opaque non-empty strings; we validate, never interpret
//! - All IDs have a canonical string representation with strict parsing
//! - IDs are typed to prevent mixing different resource kinds
//!
//! ## ID Formats
//!
//! Scheduler-generated container IDs use a prefixed format: `{prefix}_{ulid}`
//! (e.g. `step_01HV4Z2WQXKJNM8GPQY6VBKC3D`).
//!
//! Task IDs embed the task name so it can be recovered from a bare status
//! update: `{name}__{ulid}` (e.g. `broker-0-node__01HV4Z3MXNKPQR9HSTZ7WCLD4E`).

mod error;
mod macros;
mod task;
mod types;

pub use error::IdError;
pub use task::TaskId;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
