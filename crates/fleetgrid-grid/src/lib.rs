//! fleetgrid-grid — what the controller holds, and what each cluster wants.
//!
//! The [`Grid`] is the cluster-agnostic registry of every unit the
//! controller currently holds. Each cluster views the grid through a
//! [`Projection`]: the subset of members it has claimed plus the diff of
//! that subset against its [`PlacementSpec`](fleetgrid_core::PlacementSpec).
//!
//! # Components
//!
//! - **`grid`**: unit identity → [`GridMember`] registry
//! - **`members`**: per-projection membership bookkeeping
//! - **`projection`**: [`Projection`] and the [`ProjectionStrategy`] seam
//! - **`strategy`**: built-in `any`, `nodes`, and `failure_domains` rules
//! - **`registry`**: kind name → strategy lookup
//! - **`router`**: fans grid membership changes out to projections
//! - **`satisfy`**: diff output: allocation request plus eviction set

pub mod grid;
pub mod members;
pub mod projection;
pub mod registry;
pub mod router;
pub mod satisfy;
pub mod strategy;

pub use grid::{Grid, GridMember};
pub use members::MemberSet;
pub use projection::{Projection, ProjectionStrategy, SharedProjection};
pub use registry::ProjectionRegistry;
pub use router::{ProjectionEvent, ProjectionRouter};
pub use satisfy::{AllocationRequest, SatisfyState};
pub use strategy::{AnyStrategy, LocalityKey, LocalityStrategy};
