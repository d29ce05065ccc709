//! Resource provider collaborator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use fleetgrid_core::{
    BlueprintId, ClusterId, ExitInfo, ExtraProperties, ResourceUnit, UnitId,
};
use fleetgrid_grid::AllocationRequest;

/// What a claimed unit should run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaunchContext {
    pub cluster_id: ClusterId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint_id: Option<BlueprintId>,
    pub commands: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub properties: ExtraProperties,
}

/// External resource manager the controller asks for capacity.
///
/// Calls are fire-and-forget from the controller's point of view: the
/// outcome is learned from the next [`ProviderEvent`], never from the
/// return value. Errors are logged and not retried.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Replace the cluster's outstanding request with `request`.
    async fn allocate(
        &self,
        cluster: &ClusterId,
        request: &AllocationRequest,
    ) -> anyhow::Result<()>;

    /// Hand back a unit nobody claimed.
    async fn release(&self, unit: &UnitId) -> anyhow::Result<()>;

    async fn launch(&self, unit: &ResourceUnit, context: &LaunchContext) -> anyhow::Result<()>;

    async fn terminate(&self, unit: &UnitId) -> anyhow::Result<()>;
}

/// Notifications delivered by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    UnitAllocated(ResourceUnit),
    UnitCompleted(ResourceUnit, ExitInfo),
}
