use std::path::PathBuf;

use relink_io::{MappingError, OverrideError, ReportError};
use relink_recon::ReconError;

/// Problems with `relink.toml` or the step plan it describes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation error: {0}")]
    Validation(String),
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },
    #[error("dependency cycle between steps: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error(transparent)]
    Alias(#[from] ReconError),
}

/// Target-store failures.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("target database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot encode record fields: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{entity_type} record {id} does not exist in the target")]
    NotFound { entity_type: String, id: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Fatal for the step: nothing to migrate from.
    #[error("step '{step}': dump file {} not found", .path.display())]
    MissingDump { step: String, path: PathBuf },
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{0}' has no link to validate")]
    NotLinked(String),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Override(#[from] OverrideError),
}

/// Why a single row failed. Counted and logged; the step carries on.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RowFailure {
    #[error("row has no legacy identifier")]
    MissingIdentifier,
    #[error("mapped to {new_id}, but that target record no longer exists")]
    TargetGone { new_id: i64 },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Report(#[from] ReportError),
}
