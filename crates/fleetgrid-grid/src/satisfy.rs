//! Diff output: what a projection needs allocated and what it should shed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fleetgrid_core::{DomainId, NodeId, Resources, UnitId};

use crate::grid::GridMember;

/// Placement-shaped deficit forwarded to the resource provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub any: u32,
    pub nodes: BTreeMap<NodeId, u32>,
    pub failure_domains: BTreeMap<DomainId, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<bool>,
}

impl AllocationRequest {
    /// Total number of units requested.
    pub fn total(&self) -> u32 {
        self.any + self.nodes.values().sum::<u32>() + self.failure_domains.values().sum::<u32>()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Result of diffing a projection's members against its spec.
///
/// Recomputed on demand and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatisfyState {
    pub allocation: AllocationRequest,
    pub evictions: Vec<GridMember>,
}

impl SatisfyState {
    /// True when nothing needs allocating or evicting.
    pub fn is_satisfied(&self) -> bool {
        self.allocation.is_empty() && self.evictions.is_empty()
    }

    pub fn eviction_ids(&self) -> Vec<UnitId> {
        self.evictions.iter().map(|m| m.id().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_entries_do_not_count_as_a_request() {
        let mut request = AllocationRequest::default();
        request.nodes.insert("h1".into(), 0);
        assert!(request.is_empty());

        request.failure_domains.insert("/rack1".into(), 2);
        request.any = 1;
        assert_eq!(request.total(), 3);
    }

    #[test]
    fn satisfy_state_serializes_evictions_with_units() {
        let state = SatisfyState {
            allocation: AllocationRequest {
                any: 1,
                ..AllocationRequest::default()
            },
            evictions: vec![GridMember::new(fleetgrid_core::ResourceUnit::new("u1", "h1"), 3)],
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["allocation"]["any"], 1);
        assert_eq!(json["evictions"][0]["unit"]["id"], "u1");
        assert_eq!(state.eviction_ids(), vec!["u1".to_string()]);
    }
}
