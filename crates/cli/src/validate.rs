//! `relink validate` - reconcile linked steps, read-only.

use std::path::{Path, PathBuf};

use clap::Args;
use relink_engine::{validate_all, MigrationConfig, ValidationReport};
use relink_recon::StrategySet;

use crate::exit_codes::EXIT_UNMATCHED;
use crate::{load_overrides, CliError};

#[derive(Args)]
pub struct ValidateArgs {
    /// Fill missing or invalid foreign keys when exactly one confident target exists (in memory only)
    #[arg(long)]
    pub fix: bool,

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

pub fn cmd_validate(config_path: Option<&Path>, args: ValidateArgs) -> Result<(), CliError> {
    let config = MigrationConfig::discover(config_path).map_err(CliError::config)?;
    let overrides = load_overrides(args.manual_map.as_ref())?;

    let reports = validate_all(&config, &overrides, args.strategy, args.fix)
        .map_err(CliError::engine)?;

    if args.json {
        let json = serde_json::to_string_pretty(&reports)
            .map_err(|e| CliError::general(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    } else if reports.is_empty() {
        println!("no linked steps to validate");
    } else {
        for report in &reports {
            print_report(report, args.fix);
        }
    }

    let unmatched: usize = reports.iter().map(|r| r.unmatched.len()).sum();
    let invalid: usize = reports.iter().map(|r| r.fk_invalid).sum();
    if unmatched > 0 || invalid > 0 {
        return Err(CliError::new(
            EXIT_UNMATCHED,
            format!("{unmatched} row(s) unmatched, {invalid} invalid foreign key(s)"),
        ));
    }
    Ok(())
}

fn print_report(report: &ValidationReport, fix: bool) {
    println!(
        "{}: {} source rows, {} targets",
        report.step, report.source_rows, report.target_rows
    );
    println!(
        "  foreign keys: {} present, {} invalid",
        report.fk_present, report.fk_invalid
    );

    let by_strategy: Vec<String> = report
        .histogram
        .by_strategy
        .iter()
        .map(|(s, n)| format!("{s} {n}"))
        .collect();
    println!("  matches:      {}", by_strategy.join(", "));

    let hits: Vec<String> = report
        .histogram
        .strategy_hits
        .iter()
        .map(|(s, n)| format!("{s} {n}"))
        .collect();
    if !hits.is_empty() {
        println!("  hits:         {}", hits.join(", "));
    }

    println!("  unmatched:    {}", report.unmatched.len());
    for row in &report.unmatched {
        println!("    {} '{}' ({})", row.identifier, row.name, row.reason);
    }
    if fix {
        println!("  fixed:        {} (in memory; dumps untouched)", report.fixed);
    }
}
