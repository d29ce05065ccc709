//! Configuration error type shared by every FleetGrid crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration-checked operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by configuration loading and by administrative calls
/// that carry a placement spec.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown projection kind: {0}")]
    UnknownKind(String),

    #[error("placement spec has no projection kind")]
    MissingKind,

    #[error("malformed placement spec: {0}")]
    MalformedSpec(String),

    #[error("cluster already exists: {0}")]
    DuplicateCluster(String),

    #[error("cannot change projection kind of cluster {cluster} from {from} to {to}")]
    KindChange {
        cluster: String,
        from: String,
        to: String,
    },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
