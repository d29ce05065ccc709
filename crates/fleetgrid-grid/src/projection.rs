//! Per-cluster projection of the grid.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use fleetgrid_core::{PlacementSpec, ProjectionKind, UnitId};

use crate::grid::GridMember;
use crate::members::MemberSet;
use crate::satisfy::SatisfyState;

/// A projection shared between its cluster and the router.
pub type SharedProjection = Arc<Mutex<Projection>>;

/// Diff rule for one projection kind.
///
/// Implementations must be deterministic: the same members and spec always
/// produce the same [`SatisfyState`]. Eviction candidates must be held,
/// active members, and their number must equal the excess exactly.
pub trait ProjectionStrategy: Send + Sync + Debug {
    fn kind(&self) -> ProjectionKind;

    /// Whether a new member belongs to this projection given what it
    /// already holds. Fit checks (priority, resources) are done by the
    /// caller.
    fn accepts(&self, members: &MemberSet, spec: &PlacementSpec, member: &GridMember) -> bool;

    /// Location an accepted member counts toward when that is not the one
    /// it landed on.
    fn assign_location(
        &self,
        _members: &MemberSet,
        _spec: &PlacementSpec,
        _member: &GridMember,
    ) -> Option<String> {
        None
    }

    /// Diff held members against `spec`. Only the placement counts of the
    /// returned allocation are filled in.
    fn compute_satisfy_state(&self, members: &MemberSet, spec: &PlacementSpec) -> SatisfyState;
}

/// A cluster's live view of the units it holds, plus its desired spec.
#[derive(Debug)]
pub struct Projection {
    kind: ProjectionKind,
    spec: PlacementSpec,
    members: MemberSet,
    strategy: Arc<dyn ProjectionStrategy>,
    suspended: bool,
}

impl Projection {
    pub fn new(spec: PlacementSpec, strategy: Arc<dyn ProjectionStrategy>) -> Self {
        Self {
            kind: strategy.kind(),
            spec,
            members: MemberSet::new(),
            strategy,
            suspended: false,
        }
    }

    pub fn into_shared(self) -> SharedProjection {
        Arc::new(Mutex::new(self))
    }

    pub fn kind(&self) -> &ProjectionKind {
        &self.kind
    }

    pub fn spec(&self) -> &PlacementSpec {
        &self.spec
    }

    /// Replace the desired spec. The projection kind never changes.
    pub fn set_spec(&mut self, spec: PlacementSpec) {
        self.spec = PlacementSpec {
            kind: Some(self.kind.clone()),
            ..spec
        };
    }

    /// Drop every desired count, leaving only the kind.
    pub fn release_spec(&mut self) {
        self.spec = PlacementSpec {
            kind: Some(self.kind.clone()),
            ..PlacementSpec::default()
        };
    }

    pub fn priority(&self) -> Option<u32> {
        self.spec.priority
    }

    pub fn members(&self) -> &MemberSet {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<UnitId> {
        self.members.ids()
    }

    pub fn holds(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// True when the unit's priority and capacity match what this
    /// projection asks for.
    pub fn fits(&self, member: &GridMember) -> bool {
        let unit = member.unit();
        if let (Some(wanted), Some(actual)) = (self.spec.priority, unit.priority)
            && wanted != actual
        {
            return false;
        }
        if let Some(required) = &self.spec.resources
            && !unit.resources.covers(required)
        {
            return false;
        }
        true
    }

    /// Offer a new member. Returns true if it was claimed.
    pub fn accept(&mut self, member: &GridMember) -> bool {
        if self.suspended || self.members.contains(member.id()) || !self.fits(member) {
            return false;
        }
        if !self
            .strategy
            .accepts(&self.members, &self.spec, member)
        {
            return false;
        }
        let location = self
            .strategy
            .assign_location(&self.members, &self.spec, member);
        debug!(unit = %member.id(), kind = %self.kind, assigned = ?location, "projection accepted member");
        self.members.insert_assigned(member.clone(), location)
    }

    pub fn remove(&mut self, id: &str) -> Option<GridMember> {
        self.members.remove(id)
    }

    /// Diff membership against the desired spec.
    pub fn satisfy_state(&self) -> SatisfyState {
        let mut state = self
            .strategy
            .compute_satisfy_state(&self.members, &self.spec);
        state.allocation.priority = self.spec.priority;
        state.allocation.resources = self.spec.resources;
        state.allocation.locality = self.spec.locality;

        let mut seen = BTreeSet::new();
        state.evictions.retain(|m| {
            self.members.contains(m.id())
                && !self.members.is_evicting(m.id())
                && seen.insert(m.id().to_string())
        });
        state
    }

    pub fn mark_evicting(&mut self, id: &str) -> bool {
        self.members.mark_evicting(id)
    }

    pub fn clear_evicting(&mut self, id: &str) -> bool {
        self.members.clear_evicting(id)
    }

    /// Stop accepting new members.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{AnyStrategy, LocalityStrategy};
    use fleetgrid_core::{ResourceUnit, Resources};

    fn member(id: &str, node: &str, seq: u64) -> GridMember {
        GridMember::new(ResourceUnit::new(id, node), seq)
    }

    fn any(count: u32) -> Projection {
        Projection::new(PlacementSpec::any(count), Arc::new(AnyStrategy))
    }

    #[test]
    fn accepts_up_to_desired_count() {
        let mut projection = any(1);
        assert!(projection.accept(&member("a", "h1", 0)));
        assert!(!projection.accept(&member("b", "h1", 1)));
        assert!(!projection.accept(&member("a", "h1", 0)));
        assert_eq!(projection.member_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn fit_check_uses_priority_and_resources() {
        let spec = PlacementSpec::any(5)
            .with_priority(2)
            .with_resources(Resources::new(512, 1));
        let mut projection = Projection::new(spec, Arc::new(AnyStrategy));

        let small = GridMember::new(
            ResourceUnit::new("small", "h1").with_resources(Resources::new(256, 1)),
            0,
        );
        let wrong_priority = GridMember::new(
            ResourceUnit::new("p7", "h1")
                .with_resources(Resources::new(1024, 2))
                .with_priority(7),
            1,
        );
        let good = GridMember::new(
            ResourceUnit::new("good", "h1")
                .with_resources(Resources::new(512, 1))
                .with_priority(2),
            2,
        );

        assert!(!projection.accept(&small));
        assert!(!projection.accept(&wrong_priority));
        assert!(projection.accept(&good));
    }

    #[test]
    fn suspended_projection_rejects_everything() {
        let mut projection = any(3);
        projection.suspend();
        assert!(!projection.accept(&member("a", "h1", 0)));
        projection.resume();
        assert!(projection.accept(&member("a", "h1", 0)));
    }

    #[test]
    fn satisfy_state_carries_request_attributes() {
        let mut spec = PlacementSpec::any(2).with_priority(3);
        spec.locality = Some(false);
        let projection = Projection::new(spec, Arc::new(AnyStrategy));

        let state = projection.satisfy_state();
        assert_eq!(state.allocation.any, 2);
        assert_eq!(state.allocation.priority, Some(3));
        assert_eq!(state.allocation.locality, Some(false));
    }

    #[test]
    fn evicting_members_are_not_selected_twice() {
        let mut projection = any(3);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            projection.accept(&member(id, "h1", i as u64));
        }
        projection.set_spec(PlacementSpec::any(1));

        let first = projection.satisfy_state();
        assert_eq!(first.evictions.len(), 2);
        for m in &first.evictions {
            projection.mark_evicting(m.id());
        }

        let second = projection.satisfy_state();
        assert!(second.evictions.is_empty());
        assert!(second.allocation.is_empty());
    }

    #[test]
    fn relaxed_locality_counts_member_where_it_was_assigned() {
        let mut spec = PlacementSpec::nodes([("h1", 1)]);
        spec.locality = Some(false);
        let mut projection = Projection::new(spec, Arc::new(LocalityStrategy::nodes()));

        assert!(projection.accept(&member("u1", "h2", 0)));
        assert_eq!(projection.members().assigned_location("u1"), Some("h1"));

        let state = projection.satisfy_state();
        assert!(state.allocation.is_empty());
        assert!(state.evictions.is_empty());
        assert!(!projection.accept(&member("u2", "h3", 1)));
    }

    #[test]
    fn set_spec_keeps_kind() {
        let mut projection = Projection::new(
            PlacementSpec::nodes([("h1", 1)]),
            Arc::new(LocalityStrategy::nodes()),
        );
        projection.set_spec(PlacementSpec {
            nodes: Some([("h2".to_string(), 2)].into()),
            ..PlacementSpec::default()
        });
        assert_eq!(projection.spec().kind, Some(ProjectionKind::Nodes));
        assert_eq!(projection.spec().node_counts()["h2"], 2);

        projection.release_spec();
        assert_eq!(projection.spec().total_count(), 0);
        assert_eq!(projection.kind(), &ProjectionKind::Nodes);
    }
}
