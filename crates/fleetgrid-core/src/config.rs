//! fleet.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::placement::PlacementSpec;
use crate::types::{BlueprintId, DomainId, NodeId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Launch context applied to every unit before blueprint overrides.
    #[serde(default)]
    pub launch: LaunchSpec,
    #[serde(default)]
    pub blueprints: BTreeMap<BlueprintId, Blueprint>,
    pub simulator: Option<SimulatorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Eviction poller period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_api_port() -> u16 {
    8460
}

/// What to run inside a unit once it is claimed by a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Layer `overrides` on top of `self`: commands are replaced when
    /// present, environment keys from `overrides` win.
    pub fn merge(&self, overrides: &LaunchSpec) -> LaunchSpec {
        let mut environment = self.environment.clone();
        environment.extend(overrides.environment.clone());
        LaunchSpec {
            commands: overrides.commands.clone().or_else(|| self.commands.clone()),
            environment,
        }
    }
}

/// A named default placement spec, optionally with its own launch context.
///
/// A blueprint with a `kind` is instantiated as a cluster of the same name
/// when the controller starts. One without a kind is a template only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(flatten)]
    pub spec: PlacementSpec,
    #[serde(default)]
    pub launch: LaunchSpec,
}

impl Blueprint {
    pub fn new(spec: PlacementSpec) -> Self {
        Self {
            spec,
            launch: LaunchSpec::default(),
        }
    }

    pub fn is_template(&self) -> bool {
        self.spec.kind.is_none()
    }
}

/// Synthetic topology for the daemon's built-in simulated provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub nodes: Vec<SimulatedNode>,
    /// Fulfilment tick in milliseconds.
    #[serde(default = "default_fulfil_interval_ms")]
    pub fulfil_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedNode {
    pub name: NodeId,
    pub failure_domain: Option<DomainId>,
}

fn default_fulfil_interval_ms() -> u64 {
    500
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Blueprints that carry a projection kind and so get auto-started.
    pub fn instantiable_blueprints(&self) -> impl Iterator<Item = (&BlueprintId, &Blueprint)> {
        self.blueprints.iter().filter(|(_, b)| !b.is_template())
    }

    /// Check every kinded blueprint is well-formed.
    pub fn validate(&self) -> ConfigResult<()> {
        for (_, blueprint) in self.instantiable_blueprints() {
            blueprint.spec.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::ProjectionKind;
    use crate::types::Resources;

    const SAMPLE: &str = r#"
[controller]
poll_interval_ms = 250

[launch]
commands = ["bin/worker"]
[launch.environment]
LOG_LEVEL = "info"

[blueprints.web]
kind = "any"
any = 2
priority = 1
resources = { memory_mb = 512, virtual_cores = 1 }
[blueprints.web.launch.environment]
ROLE = "web"

[blueprints.pinned]
kind = "hosts"
nodes = { h1 = 2, h2 = 1 }

[blueprints.template]
priority = 5
"#;

    #[test]
    fn parses_blueprints_and_defaults() {
        let config = FleetConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.controller.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.api.port, 8460);
        assert_eq!(config.blueprints.len(), 3);

        let web = &config.blueprints["web"];
        assert_eq!(web.spec.kind, Some(ProjectionKind::Any));
        assert_eq!(web.spec.any, Some(2));
        assert_eq!(web.spec.resources, Some(Resources::new(512, 1)));
        assert_eq!(web.launch.environment["ROLE"], "web");

        let pinned = &config.blueprints["pinned"];
        assert_eq!(pinned.spec.kind, Some(ProjectionKind::Nodes));
        assert_eq!(pinned.spec.node_counts()["h1"], 2);
    }

    #[test]
    fn templates_are_not_instantiable() {
        let config = FleetConfig::from_toml_str(SAMPLE).unwrap();
        let ids: Vec<&str> = config
            .instantiable_blueprints()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, vec!["pinned", "web"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn launch_specs_layer() {
        let config = FleetConfig::from_toml_str(SAMPLE).unwrap();
        let merged = config.launch.merge(&config.blueprints["web"].launch);
        assert_eq!(merged.commands, Some(vec!["bin/worker".to_string()]));
        assert_eq!(merged.environment["LOG_LEVEL"], "info");
        assert_eq!(merged.environment["ROLE"], "web");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = FleetConfig::from_toml_str("").unwrap();
        assert_eq!(config.controller.poll_interval_ms, 1000);
        assert!(config.blueprints.is_empty());
        assert!(config.simulator.is_none());
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            FleetConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(FleetConfig::from_file(&path).unwrap().blueprints.len(), 3);
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(
            FleetConfig::from_toml_str("[blueprints.web\nkind="),
            Err(ConfigError::Parse(_))
        ));
    }
}
