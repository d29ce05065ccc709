//! Projection kind → strategy lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use fleetgrid_core::{ConfigError, ConfigResult, PlacementSpec, ProjectionKind};

use crate::projection::{Projection, ProjectionStrategy};
use crate::strategy::{AnyStrategy, LocalityStrategy};

/// Resolves a projection kind to the strategy implementing it.
///
/// The default registry knows `any`, `nodes`, and `failure_domains`.
/// Custom kinds are added with [`ProjectionRegistry::register`].
#[derive(Debug, Clone)]
pub struct ProjectionRegistry {
    strategies: HashMap<String, Arc<dyn ProjectionStrategy>>,
}

impl Default for ProjectionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(ProjectionKind::Any.name(), Arc::new(AnyStrategy));
        registry.register(ProjectionKind::Nodes.name(), Arc::new(LocalityStrategy::nodes()));
        registry.register(
            ProjectionKind::FailureDomains.name(),
            Arc::new(LocalityStrategy::failure_domains()),
        );
        registry
    }
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register a strategy under `name`, normalised the same way kind names
    /// in specs are.
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn ProjectionStrategy>) {
        let name = ProjectionKind::from(name.into()).name().to_string();
        debug!(kind = %name, "projection strategy registered");
        self.strategies.insert(name, strategy);
    }

    pub fn resolve(&self, kind: &ProjectionKind) -> ConfigResult<Arc<dyn ProjectionStrategy>> {
        self.strategies
            .get(kind.name())
            .cloned()
            .ok_or_else(|| ConfigError::UnknownKind(kind.name().to_string()))
    }

    /// Validate `spec` and build an empty projection for it.
    pub fn create(&self, spec: PlacementSpec) -> ConfigResult<Projection> {
        spec.validate()?;
        let kind = spec.kind.clone().ok_or(ConfigError::MissingKind)?;
        let strategy = self.resolve(&kind)?;
        Ok(Projection::new(spec, strategy))
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.strategies.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
