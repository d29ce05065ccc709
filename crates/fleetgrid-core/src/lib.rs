//! fleetgrid-core — shared types for the FleetGrid cluster controller.
//!
//! Holds the resource unit model handed out by a resource provider, the
//! declarative [`PlacementSpec`] describing a cluster's desired shape, and
//! the `fleet.toml` configuration parser with its named blueprints.

pub mod config;
pub mod error;
pub mod placement;
pub mod types;

pub use config::{Blueprint, FleetConfig, LaunchSpec};
pub use error::{ConfigError, ConfigResult};
pub use placement::{PlacementSpec, ProjectionKind};
pub use types::*;
