//! fleetgrid-controller — reconciles clusters against a resource provider.
//!
//! The [`ClusterController`] owns the grid, the projection router, and the
//! cluster registry behind one lock. It exposes the administrative API,
//! consumes [`ProviderEvent`]s, and drains the [`EvictionQueue`] on a
//! fixed interval.

pub mod controller;
pub mod eviction;
pub mod provider;

pub use controller::ClusterController;
pub use eviction::EvictionQueue;
pub use provider::{LaunchContext, ProviderEvent, ResourceProvider};
