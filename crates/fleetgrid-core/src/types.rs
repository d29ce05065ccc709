//! Resource unit model.
//!
//! A [`ResourceUnit`] is one slice of compute capacity handed out by the
//! external resource provider. The controller only ever reads units; the
//! provider owns their lifecycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of an allocated resource unit (provider-assigned).
pub type UnitId = String;

/// Host name of a node in the resource manager.
pub type NodeId = String;

/// Name of a failure domain (a rack, zone, or similar grouping of nodes).
pub type DomainId = String;

/// Identifier of a managed cluster.
pub type ClusterId = String;

/// Identifier of a named blueprint.
pub type BlueprintId = String;

/// Failure domain assigned to units whose provider did not resolve one.
pub const DEFAULT_FAILURE_DOMAIN: &str = "/default-rack";

/// Capacity carried by a unit, or requested per unit by a spec.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub virtual_cores: u32,
}

impl Resources {
    pub fn new(memory_mb: u64, virtual_cores: u32) -> Self {
        Self {
            memory_mb,
            virtual_cores,
        }
    }

    /// True when `self` offers at least the capacity in `required`.
    pub fn covers(&self, required: &Resources) -> bool {
        self.memory_mb >= required.memory_mb && self.virtual_cores >= required.virtual_cores
    }
}

/// One allocated compute unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceUnit {
    pub id: UnitId,
    pub node: NodeId,
    pub failure_domain: DomainId,
    #[serde(default)]
    pub resources: Resources,
    /// Request priority the provider allocated this unit under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl ResourceUnit {
    /// A unit on `node` in the default failure domain with no resources.
    pub fn new(id: impl Into<UnitId>, node: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            node: node.into(),
            failure_domain: DEFAULT_FAILURE_DOMAIN.to_string(),
            resources: Resources::default(),
            priority: None,
        }
    }

    pub fn with_failure_domain(mut self, domain: impl Into<DomainId>) -> Self {
        self.failure_domain = domain.into();
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Exit status reported by the provider when a unit completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitInfo {
    pub exit_code: i32,
    #[serde(default)]
    pub diagnostics: String,
}

impl ExitInfo {
    pub fn new(exit_code: i32, diagnostics: impl Into<String>) -> Self {
        Self {
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Free-form properties attached to a cluster at creation time.
pub type ExtraProperties = BTreeMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_unit_lands_in_default_failure_domain() {
        let unit = ResourceUnit::new("u1", "h1");
        assert_eq!(unit.failure_domain, DEFAULT_FAILURE_DOMAIN);
        assert_eq!(unit.priority, None);
    }

    #[test]
    fn resources_cover_smaller_requests_only() {
        let have = Resources::new(1024, 2);
        assert!(have.covers(&Resources::new(512, 2)));
        assert!(have.covers(&Resources::default()));
        assert!(!have.covers(&Resources::new(2048, 1)));
        assert!(!have.covers(&Resources::new(512, 4)));
    }
}
