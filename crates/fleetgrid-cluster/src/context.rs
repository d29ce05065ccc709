//! Capability handed to cluster actions.

use async_trait::async_trait;

use fleetgrid_core::{ClusterId, ResourceUnit};
use fleetgrid_grid::{AllocationRequest, SharedProjection};

/// The parts of the controller a cluster action may call.
///
/// Implementations must not dispatch events back into the calling cluster.
#[async_trait]
pub trait ClusterContext: Send + Sync {
    /// Start routing new grid members to `projection`.
    async fn register_projection(&self, cluster: &ClusterId, projection: SharedProjection);

    /// Stop routing grid members to the cluster's projection.
    async fn unregister_projection(&self, cluster: &ClusterId);

    /// Forward a deficit to the resource provider. Replaces any request the
    /// cluster has outstanding.
    async fn request_allocation(&self, cluster: &ClusterId, request: AllocationRequest);

    /// Queue units for asynchronous termination.
    async fn enqueue_eviction(&self, units: Vec<ResourceUnit>);
}
