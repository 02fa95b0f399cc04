//! `relink-engine` - Migration orchestration.
//!
//! Loads the step plan, runs steps in dependency order against a target
//! store, and offers a read-only validate mode over the same plan.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod stats;
pub mod step;
pub mod target;
pub mod validate;

pub use config::MigrationConfig;
pub use error::{ConfigError, EngineError, TargetError};
pub use orchestrator::{Migrator, Progress};
pub use stats::{RowError, RunStatus, RunSummary, StepOutcome, StepReport, StepStats};
pub use step::{MigrationStep, OnExisting, RunMode, RunOptions, StepLink};
pub use target::{Fields, SqliteTargetStore, TargetStore};
pub use validate::{validate, validate_all, ReconciledRow, ValidationReport};
