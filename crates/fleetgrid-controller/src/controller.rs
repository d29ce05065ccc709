//! Cluster controller: the reconciliation loop.
//!
//! Lock order is cluster machine, then controller state, then projection.
//! Nothing dispatches into a cluster while the state lock is held.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use fleetgrid_cluster::{Cluster, ClusterContext, ClusterEvent, ClusterSnapshot, ClusterState};
use fleetgrid_core::{
    Blueprint, BlueprintId, ClusterId, ConfigError, ConfigResult, ExitInfo, ExtraProperties,
    FleetConfig, LaunchSpec, PlacementSpec, ResourceUnit,
};
use fleetgrid_grid::{
    AllocationRequest, Grid, ProjectionRegistry, ProjectionRouter, SatisfyState,
    SharedProjection,
};

use crate::eviction::EvictionQueue;
use crate::provider::{LaunchContext, ProviderEvent, ResourceProvider};

/// Everything guarded by the controller's single coarse lock.
#[derive(Default)]
struct ControllerState {
    grid: Grid,
    router: ProjectionRouter,
    clusters: BTreeMap<ClusterId, Cluster>,
}

struct Inner {
    state: Mutex<ControllerState>,
    registry: ProjectionRegistry,
    blueprints: BTreeMap<BlueprintId, Blueprint>,
    launch: LaunchSpec,
    provider: Arc<dyn ResourceProvider>,
    evictions: EvictionQueue,
}

/// Owns every cluster and reconciles them against the resource provider.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ClusterController {
    inner: Arc<Inner>,
}

impl ClusterController {
    /// A controller with the built-in projection kinds and no blueprints.
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self::with_parts(
            provider,
            ProjectionRegistry::new(),
            BTreeMap::new(),
            LaunchSpec::default(),
        )
    }

    pub fn from_config(config: &FleetConfig, provider: Arc<dyn ResourceProvider>) -> Self {
        Self::with_parts(
            provider,
            ProjectionRegistry::new(),
            config.blueprints.clone(),
            config.launch.clone(),
        )
    }

    pub fn with_parts(
        provider: Arc<dyn ResourceProvider>,
        registry: ProjectionRegistry,
        blueprints: BTreeMap<BlueprintId, Blueprint>,
        launch: LaunchSpec,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ControllerState::default()),
                registry,
                blueprints,
                launch,
                provider,
                evictions: EvictionQueue::new(),
            }),
        }
    }

    /// Create and start a cluster for every blueprint that names a kind.
    pub async fn start(&self) -> ConfigResult<()> {
        let ids: Vec<BlueprintId> = self
            .inner
            .blueprints
            .iter()
            .filter(|(_, b)| !b.is_template())
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            self.create_cluster(
                &id,
                Some(id.as_str()),
                PlacementSpec::default(),
                ExtraProperties::new(),
            )
            .await?;
            self.start_cluster(&id).await;
        }
        let clusters = self.inner.state.lock().await.clusters.len();
        info!(clusters, "controller started");
        Ok(())
    }

    // ── Administrative API ──────────────────────────────────────

    /// Create a cluster in INITIAL, layering `spec` over the blueprint's
    /// spec when one is named.
    pub async fn create_cluster(
        &self,
        id: &str,
        blueprint_id: Option<&str>,
        spec: PlacementSpec,
        extra_properties: ExtraProperties,
    ) -> ConfigResult<ClusterSnapshot> {
        let blueprint = match blueprint_id {
            Some(name) => match self.inner.blueprints.get(name) {
                Some(blueprint) => Some(blueprint),
                None => {
                    warn!(cluster = %id, blueprint = %name, "unknown blueprint, using spec as given");
                    None
                }
            },
            None => None,
        };
        let merged = match blueprint {
            Some(blueprint) => blueprint.spec.merge(&spec),
            None => spec,
        };
        let projection = self.inner.registry.create(merged)?;
        let cluster = Cluster::new(
            id,
            blueprint.and(blueprint_id.map(str::to_string)),
            projection,
            extra_properties,
        );

        {
            let mut state = self.inner.state.lock().await;
            if state.clusters.contains_key(id) {
                return Err(ConfigError::DuplicateCluster(id.to_string()));
            }
            state.clusters.insert(id.to_string(), cluster.clone());
        }

        let snapshot = cluster.snapshot().await;
        info!(cluster = %id, kind = %snapshot.kind, blueprint = ?snapshot.blueprint_id, "cluster created");
        Ok(snapshot)
    }

    /// START, then CONFIGURE so the cluster asks for its deficit at once.
    pub async fn start_cluster(&self, id: &str) {
        let Some(cluster) = self.cluster(id).await else {
            debug!(cluster = %id, "start: no such cluster");
            return;
        };
        cluster.dispatch(ClusterEvent::Start, None, self.ctx()).await;
        cluster
            .dispatch(ClusterEvent::Configure, None, self.ctx())
            .await;
    }

    pub async fn stop_cluster(&self, id: &str) {
        let Some(cluster) = self.cluster(id).await else {
            debug!(cluster = %id, "stop: no such cluster");
            return;
        };
        cluster.dispatch(ClusterEvent::Stop, None, self.ctx()).await;
    }

    /// DESTROY, and drop the cluster from the registry once it is destroyed.
    pub async fn destroy_cluster(&self, id: &str) {
        let Some(cluster) = self.cluster(id).await else {
            debug!(cluster = %id, "destroy: no such cluster");
            return;
        };
        let state = cluster
            .dispatch(ClusterEvent::Destroy, None, self.ctx())
            .await;
        if state != ClusterState::Destroyed {
            debug!(cluster = %id, state = %state, "destroy ignored");
            return;
        }

        self.inner.state.lock().await.clusters.remove(id);
        cluster.finish().await;
        info!(cluster = %id, "cluster removed");
    }

    /// CONFIGURE with `spec` layered over the cluster's current spec.
    ///
    /// The projection kind cannot change.
    pub async fn modify_cluster(&self, id: &str, spec: PlacementSpec) -> ConfigResult<()> {
        let Some(cluster) = self.cluster(id).await else {
            debug!(cluster = %id, "modify: no such cluster");
            return Ok(());
        };

        let current = cluster.projection().lock().await.spec().clone();
        if let (Some(from), Some(to)) = (&current.kind, &spec.kind)
            && from != to
        {
            return Err(ConfigError::KindChange {
                cluster: id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        current.merge(&spec).validate()?;

        cluster
            .dispatch(ClusterEvent::Configure, Some(spec), self.ctx())
            .await;
        Ok(())
    }

    /// CONFIGURE without a new spec.
    pub async fn reconcile(&self, id: &str) {
        if let Some(cluster) = self.cluster(id).await {
            cluster
                .dispatch(ClusterEvent::Configure, None, self.ctx())
                .await;
        }
    }

    /// CONFIGURE every live cluster.
    pub async fn reconcile_all(&self) {
        let clusters: Vec<Cluster> = self.inner.state.lock().await.clusters.values().cloned().collect();
        for cluster in clusters {
            cluster
                .dispatch(ClusterEvent::Configure, None, self.ctx())
                .await;
        }
    }

    pub async fn list_clusters(&self) -> BTreeMap<ClusterId, ClusterSnapshot> {
        let clusters: Vec<Cluster> = self.inner.state.lock().await.clusters.values().cloned().collect();
        let mut snapshots = BTreeMap::new();
        for cluster in clusters {
            snapshots.insert(cluster.id().clone(), cluster.snapshot().await);
        }
        snapshots
    }

    pub async fn get_cluster(&self, id: &str) -> Option<ClusterSnapshot> {
        match self.cluster(id).await {
            Some(cluster) => Some(cluster.snapshot().await),
            None => None,
        }
    }

    /// Current diff for a cluster, without acting on it.
    pub async fn satisfy_state(&self, id: &str) -> Option<SatisfyState> {
        match self.cluster(id).await {
            Some(cluster) => Some(cluster.satisfy_state().await),
            None => None,
        }
    }

    /// Units queued for termination but not yet handed to the provider.
    pub async fn pending_evictions(&self) -> Vec<ResourceUnit> {
        self.inner.evictions.pending().await
    }

    /// Number of units the grid currently holds.
    pub async fn grid_size(&self) -> usize {
        self.inner.state.lock().await.grid.len()
    }

    // ── Provider callbacks ──────────────────────────────────────

    /// Register a new unit and hand it to the first projection that wants
    /// it. Units nobody claims go straight back to the provider.
    pub async fn on_unit_allocated(&self, unit: ResourceUnit) {
        let owner = {
            let mut state = self.inner.state.lock().await;
            let Some(member) = state.grid.add_member(unit.clone()) else {
                drop(state);
                warn!(unit = %unit.id, node = %unit.node, "duplicate allocation, releasing");
                self.release(&unit).await;
                return;
            };
            let owner = state
                .router
                .member_added(&member)
                .await
                .and_then(|event| state.clusters.get(event.cluster()).cloned());
            if owner.is_none() {
                state.grid.remove_member(member.id());
                state.router.member_removed(member.id()).await;
            }
            owner
        };

        let Some(cluster) = owner else {
            warn!(unit = %unit.id, node = %unit.node, "no cluster claimed unit, releasing");
            self.release(&unit).await;
            return;
        };

        let context = self.launch_context(&cluster);
        match self.inner.provider.launch(&unit, &context).await {
            Ok(()) => info!(unit = %unit.id, cluster = %cluster.id(), node = %unit.node, "unit launched"),
            Err(e) => warn!(unit = %unit.id, cluster = %cluster.id(), error = %e, "launch failed"),
        }
    }

    /// Forget a finished unit and re-run the owning cluster. A completion
    /// the grid never heard of re-runs every cluster.
    pub async fn on_unit_completed(&self, unit: ResourceUnit, exit: ExitInfo) {
        let (known, owners) = {
            let mut state = self.inner.state.lock().await;
            let known = state.grid.remove_member(&unit.id).is_some();
            let events = state.router.member_removed(&unit.id).await;
            let owners: Vec<Cluster> = events
                .iter()
                .filter_map(|e| state.clusters.get(e.cluster()).cloned())
                .collect();
            (known, owners)
        };

        if !known {
            warn!(unit = %unit.id, exit_code = exit.exit_code, "completion for unknown unit, reconciling all clusters");
            self.reconcile_all().await;
            return;
        }

        debug!(unit = %unit.id, exit_code = exit.exit_code, owners = owners.len(), "unit completed");
        for cluster in owners {
            cluster
                .dispatch(ClusterEvent::Configure, None, self.ctx())
                .await;
        }
    }

    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::UnitAllocated(unit) => self.on_unit_allocated(unit).await,
            ProviderEvent::UnitCompleted(unit, exit) => self.on_unit_completed(unit, exit).await,
        }
    }

    /// Consume provider events until shutdown or until the sender is gone.
    pub async fn run_events(
        &self,
        mut events: mpsc::Receiver<ProviderEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("provider event loop started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        error!("provider event channel closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("provider event loop shutting down");
                    break;
                }
            }
        }
    }

    // ── Eviction poller ─────────────────────────────────────────

    /// Terminate everything queued. Returns how many terminate calls
    /// succeeded. A failed unit becomes selectable for eviction again if its
    /// cluster is running, and is queued for another attempt otherwise.
    pub async fn poll_evictions(&self) -> usize {
        let units = self.inner.evictions.drain().await;
        let mut terminated = 0;
        for unit in units {
            match self.inner.provider.terminate(&unit.id).await {
                Ok(()) => {
                    debug!(unit = %unit.id, "unit terminated");
                    terminated += 1;
                }
                Err(e) => {
                    warn!(unit = %unit.id, error = %e, "terminate failed");
                    self.retry_eviction(unit).await;
                }
            }
        }
        terminated
    }

    pub async fn run_poller(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "eviction poller started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let count = self.poll_evictions().await;
                    if count > 0 {
                        info!(count, "evicted units");
                    }
                }
                _ = shutdown.changed() => {
                    info!("eviction poller shutting down");
                    break;
                }
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────

    fn ctx(&self) -> &dyn ClusterContext {
        &*self.inner
    }

    async fn cluster(&self, id: &str) -> Option<Cluster> {
        self.inner.state.lock().await.clusters.get(id).cloned()
    }

    async fn release(&self, unit: &ResourceUnit) {
        if let Err(e) = self.inner.provider.release(&unit.id).await {
            warn!(unit = %unit.id, error = %e, "release failed");
        }
    }

    /// Hand a unit whose termination failed back to its cluster. Units held
    /// by a suspended projection, or by none at all, nothing would select
    /// again, so they stay queued.
    async fn retry_eviction(&self, unit: ResourceUnit) {
        {
            let state = self.inner.state.lock().await;
            if !state.grid.contains(&unit.id) {
                return;
            }
            if let Some(owner) = state.router.owner_of(&unit.id).await
                && let Some(cluster) = state.clusters.get(&owner)
            {
                let mut projection = cluster.projection().lock().await;
                if !projection.is_suspended() {
                    projection.clear_evicting(&unit.id);
                    return;
                }
            }
        }
        debug!(unit = %unit.id, "requeueing eviction");
        self.inner.evictions.push(unit).await;
    }

    fn launch_context(&self, cluster: &Cluster) -> LaunchContext {
        let blueprint_launch = cluster
            .blueprint_id()
            .and_then(|id| self.inner.blueprints.get(id))
            .map(|b| b.launch.clone())
            .unwrap_or_default();
        let launch = self.inner.launch.merge(&blueprint_launch);

        LaunchContext {
            cluster_id: cluster.id().clone(),
            blueprint_id: cluster.blueprint_id().cloned(),
            commands: launch.commands.unwrap_or_default(),
            environment: launch.environment,
            properties: cluster.extra_properties().clone(),
        }
    }
}

#[async_trait]
impl ClusterContext for Inner {
    async fn register_projection(&self, cluster: &ClusterId, projection: SharedProjection) {
        self.state
            .lock()
            .await
            .router
            .register(cluster.clone(), projection);
    }

    async fn unregister_projection(&self, cluster: &ClusterId) {
        self.state.lock().await.router.unregister(cluster);
    }

    async fn request_allocation(&self, cluster: &ClusterId, request: AllocationRequest) {
        debug!(cluster = %cluster, total = request.total(), "requesting allocation");
        if let Err(e) = self.provider.allocate(cluster, &request).await {
            warn!(cluster = %cluster, error = %e, "allocation request failed");
        }
    }

    async fn enqueue_eviction(&self, units: Vec<ResourceUnit>) {
        debug!(count = units.len(), "queueing evictions");
        self.evictions.extend(units).await;
    }
}
