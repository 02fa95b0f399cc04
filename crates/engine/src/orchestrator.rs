//! Step execution.
//!
//! A step parses its dump, canonicalizes each row, and consults the mapping
//! store before touching the target: mapped rows are skipped (or refreshed),
//! unmapped rows are created and their new id recorded at once. Rerunning a
//! step therefore converges instead of duplicating records.
//!
//! Dry-run is decided here and only here. Parsing and reconciliation still
//! happen, so counts and the unmatched report match what an execute run
//! would produce.

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{debug, error, info, warn};
use relink_io::{parse_file, ManualOverrides, MappingStore, UnmatchedReport, UnmatchedRow};
use relink_recon::{
    columns, AliasTable, CanonicalRow, FreeDomains, MatchResult, Reconciler, TargetIndex,
    UnmatchedReason,
};

use crate::config::MigrationConfig;
use crate::error::{EngineError, RowFailure};
use crate::stats::{RowError, RunSummary, StepOutcome, StepStats};
use crate::step::{MigrationStep, OnExisting, RunOptions, StepLink};
use crate::target::{fields_of, TargetStore};

/// Progress notifications, one per batch and one per finished step.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    StepStarted { step: &'a str, rows: usize },
    Batch { step: &'a str, done: usize, total: usize },
    StepFinished { step: &'a str, stats: &'a StepStats },
}

type ProgressFn = Box<dyn FnMut(&Progress<'_>)>;

enum RowOutcome {
    Created,
    Updated,
    Skipped,
}

pub struct Migrator<T: TargetStore> {
    config: MigrationConfig,
    aliases: AliasTable,
    free: FreeDomains,
    mappings: MappingStore,
    target: T,
    overrides: ManualOverrides,
    report: UnmatchedReport,
    progress: Option<ProgressFn>,
}

impl<T: TargetStore> Migrator<T> {
    pub fn new(config: MigrationConfig, mappings: MappingStore, target: T) -> Result<Self, EngineError> {
        let aliases = config.alias_table()?;
        let free = config.free_domains();
        let report = UnmatchedReport::open(config.unmatched_report_path());
        Ok(Self {
            config,
            aliases,
            free,
            mappings,
            target,
            overrides: ManualOverrides::new(),
            report,
            progress: None,
        })
    }

    pub fn with_overrides(mut self, overrides: ManualOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_report(mut self, report: UnmatchedReport) -> Self {
        self.report = report;
        self
    }

    pub fn with_progress(mut self, progress: impl FnMut(&Progress<'_>) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn report(&self) -> &UnmatchedReport {
        &self.report
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Every step in dependency order. A step whose dump is missing aborts;
    /// steps depending on it, directly or not, are skipped. Independent steps
    /// still run.
    pub fn run_all(&mut self, options: &RunOptions) -> Result<RunSummary, EngineError> {
        let plan = self.config.plan()?;
        let mut summary = RunSummary::default();
        let mut failed: BTreeSet<String> = BTreeSet::new();

        for step in &plan {
            if let Some(blocker) = step.depends_on.iter().find(|d| failed.contains(*d)) {
                warn!("step '{}' skipped: blocked by '{blocker}'", step.name);
                summary.push(
                    step.name.clone(),
                    StepOutcome::Skipped {
                        blocked_by: blocker.clone(),
                    },
                );
                failed.insert(step.name.clone());
                continue;
            }

            match self.run_step(step, options) {
                Ok(stats) => summary.push(step.name.clone(), StepOutcome::Completed { stats }),
                Err(e) => {
                    error!("step '{}' aborted: {e}", step.name);
                    summary.push(
                        step.name.clone(),
                        StepOutcome::Aborted {
                            reason: e.to_string(),
                        },
                    );
                    failed.insert(step.name.clone());
                }
            }
        }
        Ok(summary)
    }

    /// One named step, wrapped in a summary like `run_all`.
    pub fn run_named(&mut self, name: &str, options: &RunOptions) -> Result<RunSummary, EngineError> {
        let step = self
            .config
            .step(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownStep(name.to_string()))?;
        let mut summary = RunSummary::default();
        match self.run_step(&step, options) {
            Ok(stats) => summary.push(step.name, StepOutcome::Completed { stats }),
            Err(e @ EngineError::MissingDump { .. }) => {
                error!("step '{}' aborted: {e}", step.name);
                summary.push(
                    step.name,
                    StepOutcome::Aborted {
                        reason: e.to_string(),
                    },
                );
            }
            Err(e) => return Err(e),
        }
        Ok(summary)
    }

    pub fn run_step(&mut self, step: &MigrationStep, options: &RunOptions) -> Result<StepStats, EngineError> {
        let dump = self.existing_dump(step, &step.dump)?;
        info!(
            "step '{}' ({}): {} from {}",
            step.name,
            options.mode,
            step.entity_type,
            dump.display()
        );

        let parsed = parse_file(&dump, &step.entity_type);
        let rows: Vec<CanonicalRow> = parsed
            .rows
            .iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|r| self.aliases.canonicalize(r))
            .collect();

        let index = match &step.link {
            Some(link) => Some(self.link_index(step, link)?),
            None => None,
        };

        let mut stats = StepStats {
            parse_warnings: parsed.warnings.len(),
            ..StepStats::default()
        };
        self.notify(&Progress::StepStarted {
            step: &step.name,
            rows: rows.len(),
        });

        // Held apart from `self` while rows mutate the stores.
        let overrides = std::mem::take(&mut self.overrides);
        let reconciler = match (&index, &step.link) {
            (Some(index), Some(link)) => Some(
                Reconciler::new(index, &overrides, options.strategies)
                    .with_foreign_key(&link.foreign_key),
            ),
            _ => None,
        };

        let batch_size = options.batch_size.max(1);
        for row in &rows {
            stats.attempted += 1;

            match self.process_row(step, row, reconciler.as_ref(), options, &mut stats) {
                Ok(RowOutcome::Created) => stats.created += 1,
                Ok(RowOutcome::Updated) => stats.updated += 1,
                Ok(RowOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    let old_id = row.text(columns::ID).unwrap_or_default();
                    let statement = format!("line {}, tuple {}", row.line, row.tuple);
                    error!(
                        "step '{}' {} '{}' ({statement}): {e}",
                        step.name, step.entity_type, old_id
                    );
                    stats.errors += 1;
                    stats.errors_detail.push(RowError {
                        old_id,
                        display_name: row.display_name(),
                        statement,
                        message: e.to_string(),
                    });
                }
            }

            if stats.attempted % batch_size == 0 {
                self.notify(&Progress::Batch {
                    step: &step.name,
                    done: stats.attempted,
                    total: rows.len(),
                });
            }
        }

        self.overrides = overrides;

        info!(
            "step '{}' done: {} attempted, {} created, {} updated, {} skipped, {} unmatched, {} errors",
            step.name,
            stats.attempted,
            stats.created,
            stats.updated,
            stats.skipped,
            stats.unmatched,
            stats.errors
        );
        self.notify(&Progress::StepFinished {
            step: &step.name,
            stats: &stats,
        });
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    fn process_row(
        &mut self,
        step: &MigrationStep,
        row: &CanonicalRow,
        reconciler: Option<&Reconciler<'_>>,
        options: &RunOptions,
        stats: &mut StepStats,
    ) -> Result<RowOutcome, RowFailure> {
        let Some(old_id) = row.text(columns::ID) else {
            self.report.append(&UnmatchedRow::now(
                "",
                row.display_name(),
                "",
                UnmatchedReason::MissingIdentifier.as_str(),
            ))?;
            return Err(RowFailure::MissingIdentifier);
        };
        let dry_run = options.mode.is_dry_run();

        if let Some(new_id) = self.mappings.get(&old_id, &step.entity_type)? {
            if !self.target.exists(&step.entity_type, new_id)? {
                return Err(RowFailure::TargetGone { new_id });
            }
            return match step.on_existing {
                OnExisting::Skip => {
                    debug!("{} '{old_id}' already migrated as {new_id}", step.entity_type);
                    Ok(RowOutcome::Skipped)
                }
                OnExisting::Refresh => {
                    let link = self.resolve_link(step, row, &old_id, reconciler, dry_run, stats)?;
                    if !dry_run {
                        self.target.update(&step.entity_type, new_id, &fields_of(row))?;
                        self.assign(step, new_id, link)?;
                    }
                    Ok(RowOutcome::Updated)
                }
            };
        }

        let link = self.resolve_link(step, row, &old_id, reconciler, dry_run, stats)?;
        if dry_run {
            return Ok(RowOutcome::Created);
        }

        let new_id = self.target.create(&step.entity_type, &fields_of(row))?;
        self.mappings
            .set_with_notes(&old_id, &step.entity_type, new_id, &format!("step {}", step.name))?;
        debug!("{} '{old_id}' created as {new_id}", step.entity_type);
        self.assign(step, new_id, link)?;
        Ok(RowOutcome::Created)
    }

    /// Reconcile the parent and translate its legacy id to a target id.
    /// Unresolved links are reported and counted, never fatal for the row.
    fn resolve_link(
        &mut self,
        step: &MigrationStep,
        row: &CanonicalRow,
        old_id: &str,
        reconciler: Option<&Reconciler<'_>>,
        dry_run: bool,
        stats: &mut StepStats,
    ) -> Result<Option<i64>, RowFailure> {
        let (Some(reconciler), Some(link)) = (reconciler, &step.link) else {
            return Ok(None);
        };
        let partial_fk = row.text(&link.foreign_key).unwrap_or_default();

        let result: MatchResult = reconciler.reconcile(row);
        let target_old_id = match (&result.target_id, result.reason) {
            (Some(target), _) => target.clone(),
            (None, reason) => {
                let reason = reason.unwrap_or(UnmatchedReason::NoMatchFound);
                self.unmatched(row, old_id, &partial_fk, reason, stats)?;
                return Ok(None);
            }
        };

        // Target mappings only exist once the parent step has executed.
        if dry_run {
            return Ok(None);
        }
        match self.mappings.get(&target_old_id, &link.entity_type)? {
            Some(target_id) => Ok(Some(target_id)),
            None => {
                self.unmatched(row, old_id, &target_old_id, UnmatchedReason::TargetNotMigrated, stats)?;
                Ok(None)
            }
        }
    }

    fn unmatched(
        &mut self,
        row: &CanonicalRow,
        old_id: &str,
        partial_fk: &str,
        reason: UnmatchedReason,
        stats: &mut StepStats,
    ) -> Result<(), RowFailure> {
        debug!("{} '{old_id}' unmatched: {reason}", row.entity_type);
        stats.unmatched += 1;
        self.report.append(&UnmatchedRow::now(
            old_id,
            row.display_name(),
            partial_fk,
            reason.as_str(),
        ))?;
        Ok(())
    }

    fn assign(&mut self, step: &MigrationStep, new_id: i64, link: Option<i64>) -> Result<(), RowFailure> {
        if let (Some(target_id), Some(step_link)) = (link, &step.link) {
            self.target
                .assign(&step.entity_type, new_id, &step_link.association, target_id)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn existing_dump(&self, step: &MigrationStep, dump: &std::path::Path) -> Result<PathBuf, EngineError> {
        let path = self.config.dump_path(dump);
        if path.is_file() {
            Ok(path)
        } else {
            Err(EngineError::MissingDump {
                step: step.name.clone(),
                path,
            })
        }
    }

    fn link_index(&self, step: &MigrationStep, link: &StepLink) -> Result<TargetIndex, EngineError> {
        let path = self.existing_dump(step, &link.dump)?;
        let parsed = parse_file(&path, &link.entity_type);
        let rows: Vec<CanonicalRow> = parsed
            .rows
            .iter()
            .map(|r| self.aliases.canonicalize(r))
            .collect();
        let index = TargetIndex::build(&rows, self.free.clone());
        debug!(
            "step '{}': {} {} targets indexed",
            step.name,
            index.len(),
            link.entity_type
        );
        Ok(index)
    }

    fn notify(&mut self, event: &Progress<'_>) {
        if let Some(progress) = self.progress.as_mut() {
            progress(event);
        }
    }
}
