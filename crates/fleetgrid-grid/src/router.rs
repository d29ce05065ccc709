//! Fans grid membership changes out to registered projections.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use fleetgrid_core::{ClusterId, UnitId};

use crate::grid::GridMember;
use crate::projection::SharedProjection;

/// Membership change observed on one projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProjectionEvent {
    MemberAdded { cluster: ClusterId, unit: UnitId },
    MemberRemoved { cluster: ClusterId, unit: UnitId },
}

impl ProjectionEvent {
    pub fn cluster(&self) -> &str {
        match self {
            ProjectionEvent::MemberAdded { cluster, .. }
            | ProjectionEvent::MemberRemoved { cluster, .. } => cluster,
        }
    }

    pub fn unit(&self) -> &str {
        match self {
            ProjectionEvent::MemberAdded { unit, .. }
            | ProjectionEvent::MemberRemoved { unit, .. } => unit,
        }
    }
}

/// The live set of projections receiving grid events, keyed by cluster.
#[derive(Debug, Default)]
pub struct ProjectionRouter {
    projections: BTreeMap<ClusterId, SharedProjection>,
}

impl ProjectionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cluster: impl Into<ClusterId>, projection: SharedProjection) {
        let cluster = cluster.into();
        debug!(cluster = %cluster, "projection registered with router");
        self.projections.insert(cluster, projection);
    }

    pub fn unregister(&mut self, cluster: &str) -> Option<SharedProjection> {
        let removed = self.projections.remove(cluster);
        if removed.is_some() {
            debug!(cluster = %cluster, "projection unregistered from router");
        }
        removed
    }

    pub fn is_registered(&self, cluster: &str) -> bool {
        self.projections.contains_key(cluster)
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    pub fn ids(&self) -> Vec<ClusterId> {
        self.projections.keys().cloned().collect()
    }

    /// Offer a new member to projections in ascending priority order
    /// (unset priority last, ties by cluster id). The first to accept
    /// claims it.
    pub async fn member_added(&self, member: &GridMember) -> Option<ProjectionEvent> {
        let mut order = Vec::with_capacity(self.projections.len());
        for (cluster, projection) in &self.projections {
            let priority = projection.lock().await.priority();
            order.push((priority.is_none(), priority, cluster));
        }
        order.sort();

        for (_, _, cluster) in order {
            let Some(projection) = self.projections.get(cluster) else {
                continue;
            };
            if projection.lock().await.accept(member) {
                debug!(cluster = %cluster, unit = %member.id(), "member claimed");
                return Some(ProjectionEvent::MemberAdded {
                    cluster: cluster.clone(),
                    unit: member.id().to_string(),
                });
            }
        }
        debug!(unit = %member.id(), "no projection claimed member");
        None
    }

    /// Drop a member from whichever projections hold it.
    pub async fn member_removed(&self, id: &str) -> Vec<ProjectionEvent> {
        let mut events = Vec::new();
        for (cluster, projection) in &self.projections {
            if projection.lock().await.remove(id).is_some() {
                debug!(cluster = %cluster, unit = %id, "member removed from projection");
                events.push(ProjectionEvent::MemberRemoved {
                    cluster: cluster.clone(),
                    unit: id.to_string(),
                });
            }
        }
        events
    }

    /// Cluster whose projection currently holds `id`.
    pub async fn owner_of(&self, id: &str) -> Option<ClusterId> {
        for (cluster, projection) in &self.projections {
            if projection.lock().await.holds(id) {
                return Some(cluster.clone());
            }
        }
        None
    }
}
