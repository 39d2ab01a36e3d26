//! # armada-spec
//!
//! The declarative service specification model consumed by the armada
//! scheduler. A [`ServiceSpecification`] describes the pods and tasks a
//! service wants running; the scheduler reconciles cluster state to it.
//!
//! Key concepts:
//!
//! - **Specification**: immutable per generation; a new generation is a new
//!   [`ConfigTarget`].
//! - **Config target**: content hash of the canonical-JSON form of a
//!   specification. Tasks carry the target they were launched against, which
//!   is how rolling configuration updates are detected.
//! - **Validation**: structural rules a new generation must satisfy relative
//!   to the previous one (task sets cannot shrink, volumes cannot change).

mod placement;
mod service;
mod target;
mod validate;

pub use placement::PlacementRule;
pub use service::{
    GoalState, HealthCheckSpec, PodInstance, PodSpec, PortRange, ResourceSet, ResourceSpec,
    ResourceValue, ServiceSpecification, TaskSpec, VolumeSpec,
};
pub use target::ConfigTarget;
pub use validate::{
    SpecValidator, TaskSetsCannotShrink, TaskVolumesCannotChange, ValidationError,
};
