use std::fmt;
use std::path::PathBuf;

use relink_recon::{columns, StrategySet};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One unit of a migration plan: a dump file for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub name: String,
    /// Position in the config file; tie-breaker for dependency order.
    #[serde(skip)]
    pub order_index: usize,
    pub entity_type: String,
    /// Relative to the config's `dump_dir`.
    pub dump: PathBuf,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub on_existing: OnExisting,
    #[serde(default)]
    pub link: Option<StepLink>,
}

/// Parent association resolved through the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLink {
    /// Entity type of the target rows (`company`).
    pub entity_type: String,
    /// Dump holding the target rows.
    pub dump: PathBuf,
    /// Association name in the target store.
    pub association: String,
    /// Canonical source column carrying the legacy target id.
    #[serde(default = "default_foreign_key")]
    pub foreign_key: String,
}

fn default_foreign_key() -> String {
    columns::COMPANY_ID.to_string()
}

/// What to do with a row whose mapping already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExisting {
    #[default]
    Skip,
    /// Rewrite the record fields and re-link the association.
    Refresh,
}

impl fmt::Display for OnExisting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Parse, reconcile and count; no target or mapping writes.
    #[default]
    DryRun,
    Execute,
}

impl RunMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Rows skipped from the start of the dump.
    pub offset: usize,
    /// Maximum rows processed after the offset.
    pub limit: Option<usize>,
    pub strategies: StrategySet,
    /// Rows per progress line.
    pub batch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::DryRun,
            offset: 0,
            limit: None,
            strategies: StrategySet::ALL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RunOptions {
    pub fn execute() -> Self {
        Self {
            mode: RunMode::Execute,
            ..Self::default()
        }
    }
}
