//! `relink migrate` - run steps against the mapping and target stores.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use log::{debug, info};
use relink_engine::{
    MigrationConfig, Migrator, Progress, RunMode, RunOptions, RunStatus, RunSummary,
    SqliteTargetStore, StepOutcome, StepStats,
};
use relink_io::MappingStore;
use relink_recon::StrategySet;
use serde::Serialize;

use crate::exit_codes::{EXIT_ROW_ERRORS, EXIT_STEP_ABORTED, EXIT_UNMATCHED};
use crate::{load_overrides, CliError};

/// Row errors listed in the human summary before truncating.
const MAX_ERRORS_SHOWN: usize = 20;

#[derive(Args)]
pub struct MigrateArgs {
    /// Step name, or `all` for the whole plan
    pub step: String,

    /// Parse, reconcile and count without writing (default)
    #[arg(long)]
    pub dry_run: bool,

    /// Write records and mappings
    #[arg(long, conflicts_with = "dry_run")]
    pub execute: bool,

    /// Process at most N rows per step
    #[arg(long)]
    pub limit: Option<usize>,

    /// Skip the first N rows of each dump
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Reconciliation strategies: uuid, email, domain, name or all
    #[arg(long, default_value = "all")]
    pub strategy: StrategySet,

    /// CSV of key,target_id overrides consulted before any strategy
    #[arg(long)]
    pub manual_map: Option<PathBuf>,

    /// Output JSON to stdout instead of human summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct MigrateOutput<'a> {
    mode: RunMode,
    status: RunStatus,
    unmatched_report: &'a Path,
    unmatched_appended: usize,
    #[serde(flatten)]
    summary: &'a RunSummary,
    totals: StepStats,
}

pub fn cmd_migrate(config_path: Option<&Path>, args: MigrateArgs) -> Result<(), CliError> {
    let config = MigrationConfig::discover(config_path).map_err(CliError::config)?;
    let overrides = load_overrides(args.manual_map.as_ref())?;
    let mode = if args.execute {
        RunMode::Execute
    } else {
        RunMode::DryRun
    };

    let (mappings, target) = open_stores(&config, mode)?;
    info!("migrate {} ({mode})", args.step);
    let options = RunOptions {
        mode,
        offset: args.offset,
        limit: args.limit,
        strategies: args.strategy,
        batch_size: config.batch_size,
    };

    let mut migrator = Migrator::new(config, mappings, target)
        .map_err(CliError::engine)?
        .with_overrides(overrides);
    if !args.json {
        migrator = migrator.with_progress(print_progress);
    }

    let summary = if args.step == "all" {
        migrator.run_all(&options)
    } else {
        migrator.run_named(&args.step, &options)
    }
    .map_err(CliError::engine)?;

    let report_path = migrator.report().path().to_path_buf();
    let appended = migrator.report().appended();

    if args.json {
        let output = MigrateOutput {
            mode,
            status: summary.status(),
            unmatched_report: &report_path,
            unmatched_appended: appended,
            summary: &summary,
            totals: summary.totals(),
        };
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    } else {
        print_summary(mode, &summary, &report_path, appended)
            .map_err(|e| CliError::general(e.to_string()))?;
    }

    exit_for(&summary, &report_path)
}

/// Dry-run never creates database files: missing stores are stood in for by
/// empty in-memory ones.
fn open_stores(config: &MigrationConfig, mode: RunMode) -> Result<(MappingStore, SqliteTargetStore), CliError> {
    let mapping_path = config.mapping_db_path();
    let target_path = config.target_db_path();

    let mappings = if mode.is_dry_run() && !mapping_path.exists() {
        debug!("{} not found, dry-run uses an empty mapping store", mapping_path.display());
        MappingStore::open_in_memory()
    } else {
        MappingStore::open(&mapping_path)
    }
    .map_err(|e| CliError::store(format!("{}: {e}", mapping_path.display())))?;

    let target = if mode.is_dry_run() && !target_path.exists() {
        debug!("{} not found, dry-run uses an empty target store", target_path.display());
        SqliteTargetStore::open_in_memory()
    } else {
        SqliteTargetStore::open(&target_path)
    }
    .map_err(|e| CliError::store(format!("{}: {e}", target_path.display())))?;

    Ok((mappings, target))
}

fn print_progress(event: &Progress<'_>) {
    match event {
        Progress::StepStarted { step, rows } => println!("==> {step}: {rows} rows"),
        Progress::Batch { step, done, total } => println!("    {step}: {done}/{total}"),
        Progress::StepFinished { step, stats } => {
            println!("    {step}: finished {} rows", stats.attempted)
        }
    }
}

fn print_summary(
    mode: RunMode,
    summary: &RunSummary,
    report_path: &Path,
    appended: usize,
) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    writeln!(out)?;
    writeln!(out, "Summary ({mode})")?;
    for report in &summary.steps {
        match &report.outcome {
            StepOutcome::Completed { stats } => {
                writeln!(
                    out,
                    "  {:<16} {} attempted, {} created, {} updated, {} skipped",
                    report.name, stats.attempted, stats.created, stats.updated, stats.skipped
                )?;
                writeln!(
                    out,
                    "  {:<16} no match found: {}, errors: {}, parse warnings: {}",
                    "", stats.unmatched, stats.errors, stats.parse_warnings
                )?;
            }
            StepOutcome::Aborted { reason } => {
                writeln!(out, "  {:<16} ABORTED: {reason}", report.name)?;
            }
            StepOutcome::Skipped { blocked_by } => {
                writeln!(out, "  {:<16} skipped (blocked by {blocked_by})", report.name)?;
            }
        }
    }

    let totals = summary.totals();
    if !totals.errors_detail.is_empty() {
        writeln!(out)?;
        writeln!(out, "Row errors:")?;
        for e in totals.errors_detail.iter().take(MAX_ERRORS_SHOWN) {
            writeln!(
                out,
                "  {} '{}' ({}): {}",
                e.old_id, e.display_name, e.statement, e.message
            )?;
        }
        if totals.errors_detail.len() > MAX_ERRORS_SHOWN {
            writeln!(
                out,
                "  ... and {} more (run with -v for the full log)",
                totals.errors_detail.len() - MAX_ERRORS_SHOWN
            )?;
        }
    }

    if appended > 0 {
        writeln!(out)?;
        writeln!(out, "{appended} rows written to {}", report_path.display())?;
    }
    if mode.is_dry_run() {
        writeln!(
            out,
            "Dry run: no records or mappings were written. Re-run with --execute to migrate."
        )?;
    }
    Ok(())
}

/// Highest applicable code: aborted > row errors > unmatched.
fn exit_for(summary: &RunSummary, report_path: &Path) -> Result<(), CliError> {
    let totals = summary.totals();
    if summary.aborted() > 0 {
        return Err(CliError::new(
            EXIT_STEP_ABORTED,
            format!("{} step(s) aborted or skipped", summary.aborted()),
        ));
    }
    if totals.errors > 0 {
        return Err(CliError::new(
            EXIT_ROW_ERRORS,
            format!("{} row(s) failed", totals.errors),
        ));
    }
    if totals.unmatched > 0 {
        return Err(CliError::new(
            EXIT_UNMATCHED,
            format!("{} row(s) unmatched", totals.unmatched),
        )
        .with_hint(format!(
            "review {} and feed corrections back with --manual-map",
            report_path.display()
        )));
    }
    Ok(())
}
