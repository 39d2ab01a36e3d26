//! Typed ID definitions for scheduler resources.
//!
//! Plan containers get ULID-based IDs generated locally. Offers, agents and
//! the framework registration are identified by the cluster manager; those
//! IDs are opaque.

use crate::{define_id, define_opaque_id};

// =============================================================================
// Plan Hierarchy
// =============================================================================

define_id!(PlanId, "plan");
define_id!(PhaseId, "phase");
define_id!(StepId, "step");

// =============================================================================
// Cluster-Manager Assigned
// =============================================================================

define_opaque_id!(FrameworkId);
define_opaque_id!(OfferId);
define_opaque_id!(AgentId);
define_opaque_id!(ExecutorId);
