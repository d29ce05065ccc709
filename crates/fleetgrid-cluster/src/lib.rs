//! fleetgrid-cluster — one managed cluster and its lifecycle.
//!
//! A [`Cluster`] pairs a projection with a [`ClusterFsm`]. Events are
//! dispatched through an explicit transition table; the actions they
//! trigger reach back into the controller only through the narrow
//! [`ClusterContext`] capability passed into each dispatch.

pub mod cluster;
pub mod context;
pub mod fsm;

pub use cluster::{Cluster, ClusterSnapshot};
pub use context::ClusterContext;
pub use fsm::{ClusterAction, ClusterEvent, ClusterFsm, ClusterState, Transition};
