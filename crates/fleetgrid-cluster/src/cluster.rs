//! A managed cluster: projection, lifecycle machine, and properties.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use fleetgrid_core::{
    BlueprintId, ClusterId, ExtraProperties, PlacementSpec, ProjectionKind, ResourceUnit, UnitId,
};
use fleetgrid_grid::{Projection, SatisfyState, SharedProjection};

use crate::context::ClusterContext;
use crate::fsm::{ClusterAction, ClusterEvent, ClusterFsm, ClusterState};

/// Point-in-time view of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub state: ClusterState,
    pub kind: ProjectionKind,
    pub members: Vec<UnitId>,
    pub spec: PlacementSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint_id: Option<BlueprintId>,
    #[serde(skip_serializing_if = "ExtraProperties::is_empty")]
    pub extra_properties: ExtraProperties,
}

/// One managed cluster. Cloning shares the underlying state.
///
/// Dispatch holds the machine's lock for the whole transition, so events
/// for one cluster never interleave while different clusters proceed in
/// parallel.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    blueprint_id: Option<BlueprintId>,
    projection: SharedProjection,
    fsm: Arc<Mutex<ClusterFsm>>,
    extra_properties: ExtraProperties,
}

impl Cluster {
    pub fn new(
        id: impl Into<ClusterId>,
        blueprint_id: Option<BlueprintId>,
        projection: Projection,
        extra_properties: ExtraProperties,
    ) -> Self {
        Self {
            id: id.into(),
            blueprint_id,
            projection: projection.into_shared(),
            fsm: Arc::new(Mutex::new(ClusterFsm::new())),
            extra_properties,
        }
    }

    pub fn id(&self) -> &ClusterId {
        &self.id
    }

    pub fn blueprint_id(&self) -> Option<&BlueprintId> {
        self.blueprint_id.as_ref()
    }

    pub fn projection(&self) -> &SharedProjection {
        &self.projection
    }

    pub fn extra_properties(&self) -> &ExtraProperties {
        &self.extra_properties
    }

    pub async fn state(&self) -> ClusterState {
        self.fsm.lock().await.state()
    }

    /// Current diff, without acting on it.
    pub async fn satisfy_state(&self) -> SatisfyState {
        self.projection.lock().await.satisfy_state()
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state().await;
        let projection = self.projection.lock().await;
        ClusterSnapshot {
            id: self.id.clone(),
            state,
            kind: projection.kind().clone(),
            members: projection.member_ids(),
            spec: projection.spec().clone(),
            blueprint_id: self.blueprint_id.clone(),
            extra_properties: self.extra_properties.clone(),
        }
    }

    /// Feed one event through the machine and return the settled state.
    ///
    /// `spec` is only read by CONFIGURE, where it is layered over the
    /// projection's current spec before diffing.
    pub async fn dispatch(
        &self,
        event: ClusterEvent,
        spec: Option<PlacementSpec>,
        ctx: &dyn ClusterContext,
    ) -> ClusterState {
        let mut fsm = self.fsm.lock().await;
        let from = fsm.state();
        let Some(transition) = fsm.transition(event) else {
            debug!(cluster = %self.id, state = %from, event = ?event, "event ignored");
            return from;
        };

        fsm.enter(transition.target);
        self.run_action(transition.action, spec, ctx).await;
        let settled = fsm.settle();

        debug!(cluster = %self.id, from = %from, event = ?event, to = %settled, "cluster transition");
        settled
    }

    /// Move a destroyed cluster into FINAL once the controller has let go
    /// of it.
    pub async fn finish(&self) -> bool {
        self.fsm.lock().await.finish()
    }

    async fn run_action(
        &self,
        action: ClusterAction,
        spec: Option<PlacementSpec>,
        ctx: &dyn ClusterContext,
    ) {
        match action {
            ClusterAction::Start => {
                ctx.register_projection(&self.id, self.projection.clone())
                    .await;
                info!(cluster = %self.id, "cluster started");
            }
            ClusterAction::Allocate => self.allocate(spec, ctx).await,
            ClusterAction::Stop => {
                let units = {
                    let mut projection = self.projection.lock().await;
                    projection.suspend();
                    let units: Vec<ResourceUnit> = projection
                        .members()
                        .active()
                        .map(|m| m.unit().clone())
                        .collect();
                    for unit in &units {
                        projection.mark_evicting(&unit.id);
                    }
                    units
                };
                info!(cluster = %self.id, evicting = units.len(), "cluster stopping");
                if !units.is_empty() {
                    ctx.enqueue_eviction(units).await;
                }
            }
            ClusterAction::Resume => {
                self.projection.lock().await.resume();
                info!(cluster = %self.id, "cluster resumed");
            }
            ClusterAction::Destroy => {
                ctx.unregister_projection(&self.id).await;
                self.projection.lock().await.release_spec();
                info!(cluster = %self.id, "cluster destroyed");
            }
        }
    }

    async fn allocate(&self, spec: Option<PlacementSpec>, ctx: &dyn ClusterContext) {
        let state = {
            let mut projection = self.projection.lock().await;
            if let Some(overrides) = spec {
                let merged = projection.spec().merge(&overrides);
                projection.set_spec(merged);
            }
            let state = projection.satisfy_state();
            for member in &state.evictions {
                projection.mark_evicting(member.id());
            }
            state
        };

        debug!(
            cluster = %self.id,
            any = state.allocation.any,
            nodes = ?state.allocation.nodes,
            failure_domains = ?state.allocation.failure_domains,
            evictions = state.evictions.len(),
            "computed satisfy state"
        );

        ctx.request_allocation(&self.id, state.allocation).await;
        if !state.evictions.is_empty() {
            let units = state.evictions.into_iter().map(|m| m.unit().clone()).collect();
            ctx.enqueue_eviction(units).await;
        }
    }
}
