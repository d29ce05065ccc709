//! Placement specs, the declarative desired shape of a cluster.
//!
//! Every field of a [`PlacementSpec`] is optional so that a spec can act
//! both as a full description and as a partial override layered on top
//! of a named blueprint via [`PlacementSpec::merge`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DomainId, NodeId, Resources};

/// Which diff rule a cluster's projection applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProjectionKind {
    /// Count-only: hold `any` units wherever they land.
    Any,
    /// Per-node counts.
    Nodes,
    /// Per-failure-domain counts.
    FailureDomains,
    /// Externally registered kind, resolved by name.
    Custom(String),
}

impl ProjectionKind {
    pub fn name(&self) -> &str {
        match self {
            ProjectionKind::Any => "any",
            ProjectionKind::Nodes => "nodes",
            ProjectionKind::FailureDomains => "failure_domains",
            ProjectionKind::Custom(name) => name,
        }
    }
}

impl From<&str> for ProjectionKind {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => ProjectionKind::Any,
            "nodes" | "hosts" => ProjectionKind::Nodes,
            "failure_domains" | "failure-domains" | "racks" => ProjectionKind::FailureDomains,
            other => ProjectionKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for ProjectionKind {
    fn from(s: String) -> Self {
        ProjectionKind::from(s.as_str())
    }
}

impl From<ProjectionKind> for String {
    fn from(kind: ProjectionKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Desired shape of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProjectionKind>,
    /// Unit count for `any` projections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<u32>,
    /// Node → unit count for `nodes` projections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<BTreeMap<NodeId, u32>>,
    /// Failure domain → unit count for `failure_domains` projections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domains: Option<BTreeMap<DomainId, u32>>,
    /// Lower values are offered new units first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// Minimum capacity per unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    /// Whether the provider must honour node/domain placement strictly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<bool>,
}

impl PlacementSpec {
    /// Count-only spec of the `any` kind.
    pub fn any(count: u32) -> Self {
        Self {
            kind: Some(ProjectionKind::Any),
            any: Some(count),
            ..Self::default()
        }
    }

    /// Per-node spec of the `nodes` kind.
    pub fn nodes<I, K>(counts: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<NodeId>,
    {
        Self {
            kind: Some(ProjectionKind::Nodes),
            nodes: Some(counts.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            ..Self::default()
        }
    }

    /// Per-domain spec of the `failure_domains` kind.
    pub fn failure_domains<I, K>(counts: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<DomainId>,
    {
        Self {
            kind: Some(ProjectionKind::FailureDomains),
            failure_domains: Some(counts.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Layer `overrides` on top of `self` (the blueprint).
    ///
    /// Every field present in `overrides` wins. Count maps are replaced
    /// wholesale, never merged key by key.
    pub fn merge(&self, overrides: &PlacementSpec) -> PlacementSpec {
        PlacementSpec {
            kind: overrides.kind.clone().or_else(|| self.kind.clone()),
            any: overrides.any.or(self.any),
            nodes: overrides.nodes.clone().or_else(|| self.nodes.clone()),
            failure_domains: overrides
                .failure_domains
                .clone()
                .or_else(|| self.failure_domains.clone()),
            priority: overrides.priority.or(self.priority),
            resources: overrides.resources.or(self.resources),
            locality: overrides.locality.or(self.locality),
        }
    }

    pub fn any_count(&self) -> u32 {
        self.any.unwrap_or(0)
    }

    /// Node counts, empty when unset.
    pub fn node_counts(&self) -> BTreeMap<NodeId, u32> {
        self.nodes.clone().unwrap_or_default()
    }

    /// Failure domain counts, empty when unset.
    pub fn domain_counts(&self) -> BTreeMap<DomainId, u32> {
        self.failure_domains.clone().unwrap_or_default()
    }

    /// Total number of units this spec asks for across all count fields.
    pub fn total_count(&self) -> u32 {
        let nodes: u32 = self.nodes.iter().flat_map(|m| m.values()).sum();
        let domains: u32 = self.failure_domains.iter().flat_map(|m| m.values()).sum();
        self.any_count() + nodes + domains
    }

    /// Check that this spec can drive a projection.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.kind.is_none() {
            return Err(ConfigError::MissingKind);
        }
        if let Some(ProjectionKind::Custom(name)) = &self.kind
            && name.is_empty()
        {
            return Err(ConfigError::MalformedSpec("empty projection kind".into()));
        }
        if self.nodes.iter().flat_map(|m| m.keys()).any(|k| k.trim().is_empty()) {
            return Err(ConfigError::MalformedSpec("empty node name".into()));
        }
        if self
            .failure_domains
            .iter()
            .flat_map(|m| m.keys())
            .any(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MalformedSpec("empty failure domain name".into()));
        }
        Ok(())
    }
}
