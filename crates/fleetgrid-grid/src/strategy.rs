//! Built-in diff rules.
//!
//! Eviction policy for every built-in kind: the most recently added members
//! go first, so long-lived units are kept.

use std::collections::BTreeMap;

use fleetgrid_core::{PlacementSpec, ProjectionKind};

use crate::grid::GridMember;
use crate::members::MemberSet;
use crate::projection::ProjectionStrategy;
use crate::satisfy::{AllocationRequest, SatisfyState};

/// Count-only rule: hold `any` units wherever they land.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyStrategy;

impl ProjectionStrategy for AnyStrategy {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Any
    }

    fn accepts(&self, members: &MemberSet, spec: &PlacementSpec, _member: &GridMember) -> bool {
        members.active_len() < spec.any_count() as usize
    }

    fn compute_satisfy_state(&self, members: &MemberSet, spec: &PlacementSpec) -> SatisfyState {
        let desired = spec.any_count() as usize;
        let active = members.active_newest_first();

        let allocation = AllocationRequest {
            any: desired.saturating_sub(active.len()) as u32,
            ..AllocationRequest::default()
        };
        let excess = active.len().saturating_sub(desired);
        let evictions = active.into_iter().take(excess).cloned().collect();

        SatisfyState {
            allocation,
            evictions,
        }
    }
}

/// Which placement coordinate a [`LocalityStrategy`] counts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalityKey {
    Node,
    FailureDomain,
}

impl LocalityKey {
    fn of<'a>(&self, member: &'a GridMember) -> &'a str {
        match self {
            LocalityKey::Node => member.node(),
            LocalityKey::FailureDomain => member.failure_domain(),
        }
    }

    fn targets(&self, spec: &PlacementSpec) -> BTreeMap<String, u32> {
        match self {
            LocalityKey::Node => spec.node_counts(),
            LocalityKey::FailureDomain => spec.domain_counts(),
        }
    }
}

/// Per-location rule shared by the `nodes` and `failure_domains` kinds.
#[derive(Debug, Clone, Copy)]
pub struct LocalityStrategy {
    key: LocalityKey,
}

impl LocalityStrategy {
    pub fn new(key: LocalityKey) -> Self {
        Self { key }
    }

    pub fn nodes() -> Self {
        Self::new(LocalityKey::Node)
    }

    pub fn failure_domains() -> Self {
        Self::new(LocalityKey::FailureDomain)
    }

    pub fn key(&self) -> LocalityKey {
        self.key
    }

    fn has_room(
        &self,
        members: &MemberSet,
        targets: &BTreeMap<String, u32>,
        location: &str,
    ) -> bool {
        targets.get(location).is_some_and(|&wanted| {
            members.count_active_where(|m| self.key.of(m), location) < wanted as usize
        })
    }

    /// First target location still short of its count.
    fn first_open(&self, members: &MemberSet, targets: &BTreeMap<String, u32>) -> Option<String> {
        targets
            .keys()
            .find(|location| self.has_room(members, targets, location))
            .cloned()
    }
}

/// With locality off, a member landing elsewhere may stand in for a
/// location that is still short.
fn relaxed(spec: &PlacementSpec) -> bool {
    spec.locality == Some(false)
}

impl ProjectionStrategy for LocalityStrategy {
    fn kind(&self) -> ProjectionKind {
        match self.key {
            LocalityKey::Node => ProjectionKind::Nodes,
            LocalityKey::FailureDomain => ProjectionKind::FailureDomains,
        }
    }

    fn accepts(&self, members: &MemberSet, spec: &PlacementSpec, member: &GridMember) -> bool {
        let targets = self.key.targets(spec);
        if self.has_room(members, &targets, self.key.of(member)) {
            return true;
        }
        relaxed(spec) && self.first_open(members, &targets).is_some()
    }

    fn assign_location(
        &self,
        members: &MemberSet,
        spec: &PlacementSpec,
        member: &GridMember,
    ) -> Option<String> {
        let targets = self.key.targets(spec);
        if !relaxed(spec) || self.has_room(members, &targets, self.key.of(member)) {
            return None;
        }
        self.first_open(members, &targets)
    }

    fn compute_satisfy_state(&self, members: &MemberSet, spec: &PlacementSpec) -> SatisfyState {
        let targets = self.key.targets(spec);
        let groups = members.group_active_by(|m| self.key.of(m));

        let mut deficits = BTreeMap::new();
        for (location, &wanted) in &targets {
            let held = groups.get(location).map_or(0, Vec::len);
            let missing = (wanted as usize).saturating_sub(held);
            if missing > 0 {
                deficits.insert(location.clone(), missing as u32);
            }
        }

        // Locations absent from the targets want zero.
        let mut evictions = Vec::new();
        for (location, held) in &groups {
            let wanted = targets.get(location).copied().unwrap_or(0) as usize;
            let excess = held.len().saturating_sub(wanted);
            evictions.extend(held.iter().take(excess).map(|m| (*m).clone()));
        }

        let allocation = match self.key {
            LocalityKey::Node => AllocationRequest {
                nodes: deficits,
                ..AllocationRequest::default()
            },
            LocalityKey::FailureDomain => AllocationRequest {
                failure_domains: deficits,
                ..AllocationRequest::default()
            },
        };

        SatisfyState {
            allocation,
            evictions,
        }
    }
}
