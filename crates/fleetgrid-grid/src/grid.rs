//! Grid: registry of every unit the controller currently holds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use fleetgrid_core::{ResourceUnit, UnitId};

/// A held unit inside the controller's bookkeeping.
///
/// `seq` increases with every accepted unit, so a higher value means the
/// member joined the grid more recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMember {
    unit: ResourceUnit,
    seq: u64,
}

impl GridMember {
    pub fn new(unit: ResourceUnit, seq: u64) -> Self {
        Self { unit, seq }
    }

    pub fn id(&self) -> &str {
        &self.unit.id
    }

    pub fn unit(&self) -> &ResourceUnit {
        &self.unit
    }

    pub fn node(&self) -> &str {
        &self.unit.node
    }

    pub fn failure_domain(&self) -> &str {
        &self.unit.failure_domain
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Unit identity → member. A unit maps to at most one member at a time.
#[derive(Debug, Default)]
pub struct Grid {
    members: HashMap<UnitId, GridMember>,
    next_seq: u64,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit. Returns `None` if the unit is already known.
    pub fn add_member(&mut self, unit: ResourceUnit) -> Option<GridMember> {
        if self.members.contains_key(&unit.id) {
            debug!(unit = %unit.id, "unit already in grid");
            return None;
        }
        let member = GridMember::new(unit, self.next_seq);
        self.next_seq += 1;
        self.members.insert(member.id().to_string(), member.clone());
        debug!(unit = %member.id(), node = %member.node(), seq = member.seq(), "grid member added");
        Some(member)
    }

    /// Unregister a unit. Returns `None` if the unit was unknown.
    pub fn remove_member(&mut self, id: &str) -> Option<GridMember> {
        let removed = self.members.remove(id);
        debug!(unit = %id, known = removed.is_some(), "grid member removed");
        removed
    }

    pub fn get(&self, id: &str) -> Option<&GridMember> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn members(&self) -> impl Iterator<Item = &GridMember> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
