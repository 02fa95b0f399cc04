//! Read-only consistency check of linked steps.
//!
//! Reads the source and target dumps, reconciles every row with every enabled
//! strategy, and reports what a migration would link. Neither store is
//! touched and nothing is kept between calls.

use std::collections::BTreeSet;

use log::info;
use relink_io::{parse_file, ManualOverrides, UnmatchedRow, Value};
use relink_recon::{
    columns, CanonicalRow, Candidate, MatchHistogram, MatchResult, MatchStrategy, Reconciler,
    StrategySet, TargetIndex,
};
use serde::Serialize;

use crate::config::MigrationConfig;
use crate::error::EngineError;
use crate::step::MigrationStep;

/// One source row as validate mode saw it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRow {
    pub old_id: Option<String>,
    pub display_name: String,
    pub foreign_key: Option<String>,
    pub result: MatchResult,
    pub candidates: Vec<Candidate>,
    /// Foreign key filled in by `--fix`, when one was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_foreign_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub step: String,
    pub source_rows: usize,
    pub target_rows: usize,
    pub histogram: MatchHistogram,
    /// Rows carrying a non-empty foreign key.
    pub fk_present: usize,
    /// Foreign keys that name no target row.
    pub fk_invalid: usize,
    pub unmatched: Vec<UnmatchedRow>,
    pub fixed: usize,
    pub rows: Vec<ReconciledRow>,
}

/// Validate every step that declares a link, in plan order.
pub fn validate_all(
    config: &MigrationConfig,
    overrides: &ManualOverrides,
    strategies: StrategySet,
    fix: bool,
) -> Result<Vec<ValidationReport>, EngineError> {
    let mut reports = Vec::new();
    for step in config.plan()?.iter().filter(|s| s.link.is_some()) {
        reports.push(validate(config, step, overrides, strategies, fix)?);
    }
    Ok(reports)
}

pub fn validate(
    config: &MigrationConfig,
    step: &MigrationStep,
    overrides: &ManualOverrides,
    strategies: StrategySet,
    fix: bool,
) -> Result<ValidationReport, EngineError> {
    let Some(link) = &step.link else {
        return Err(EngineError::NotLinked(step.name.clone()));
    };
    let aliases = config.alias_table()?;

    let canonical = |entity_type: &str, dump: &std::path::Path| -> Result<Vec<CanonicalRow>, EngineError> {
        let path = config.dump_path(dump);
        if !path.is_file() {
            return Err(EngineError::MissingDump {
                step: step.name.clone(),
                path,
            });
        }
        Ok(parse_file(&path, entity_type)
            .rows
            .iter()
            .map(|r| aliases.canonicalize(r))
            .collect())
    };

    let targets = canonical(&link.entity_type, link.dump.as_path())?;
    let sources = canonical(&step.entity_type, step.dump.as_path())?;
    let index = TargetIndex::build(&targets, config.free_domains());
    let reconciler =
        Reconciler::new(&index, overrides, strategies).with_foreign_key(&link.foreign_key);

    let mut report = ValidationReport {
        step: step.name.clone(),
        source_rows: sources.len(),
        target_rows: index.len(),
        histogram: MatchHistogram::default(),
        fk_present: 0,
        fk_invalid: 0,
        unmatched: Vec::new(),
        fixed: 0,
        rows: Vec::with_capacity(sources.len()),
    };

    for source in sources {
        // Rows are a private view; a fix never reaches the dump file.
        let mut row = source;
        let foreign_key = row.reference(&link.foreign_key);
        let fk_valid = match &foreign_key {
            Some(fk) => {
                report.fk_present += 1;
                let valid = index.contains_id(fk);
                if !valid {
                    report.fk_invalid += 1;
                }
                valid
            }
            None => false,
        };

        let candidates = reconciler.reconcile_all(&row);
        let result = reconciler.reconcile(&row);
        report.histogram.record(&result);
        report.histogram.record_candidates(&candidates);

        let old_id = row.text(columns::ID);
        if let Some(reason) = result.reason {
            report.unmatched.push(UnmatchedRow::now(
                old_id.clone().unwrap_or_default(),
                row.display_name(),
                foreign_key.clone().unwrap_or_default(),
                reason.as_str(),
            ));
        }

        let mut fixed_foreign_key = None;
        if fix && !fk_valid {
            if let Some(target) = confident_target(&candidates) {
                row.set(&link.foreign_key, Value::Text(target.clone()));
                report.fixed += 1;
                fixed_foreign_key = Some(target);
            }
        }

        report.rows.push(ReconciledRow {
            old_id,
            display_name: row.display_name(),
            foreign_key,
            result,
            candidates,
            fixed_foreign_key,
        });
    }

    info!(
        "validate '{}': {} rows, {} matched, {} unmatched, {} invalid foreign keys, {} fixed",
        report.step,
        report.source_rows,
        report.histogram.matched,
        report.histogram.unmatched,
        report.fk_invalid,
        report.fixed
    );
    Ok(report)
}

/// The single target named by the confident automatic strategies, if they
/// agree on exactly one.
fn confident_target(candidates: &[Candidate]) -> Option<String> {
    let targets: BTreeSet<&str> = candidates
        .iter()
        .filter(|c| {
            matches!(
                c.strategy,
                MatchStrategy::ExactId | MatchStrategy::ExactEmail | MatchStrategy::Domain
            )
        })
        .map(|c| c.target_id.as_str())
        .collect();
    if targets.len() == 1 {
        targets.into_iter().next().map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const COMPANIES: &str = "INSERT INTO companies (id, name, email) VALUES \
        (10,'Initech','info@initech.com'),(11,'Acme','contact@acme.io'),(12,'Globex','hello@globex.com');";

    const USERS: &str = "INSERT INTO users (id, email, first_name, last_name, company_id) VALUES \
        (1,'contact@acme.io','Ann','Lee',NULL),\
        (2,'someone@gmail.com','Some','One',NULL),\
        (3,'bob@initech.com','Bob','Stone',10),\
        (4,'eve@globex.com','Eve','Moss',99);";

    fn fixture(dir: &Path) -> MigrationConfig {
        std::fs::write(dir.join("companies.sql"), COMPANIES).unwrap();
        std::fs::write(dir.join("users.sql"), USERS).unwrap();
        let mut config = MigrationConfig::default();
        config.base_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn counts_and_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let step = config.step("users").unwrap();
        let report = validate(&config, step, &ManualOverrides::new(), StrategySet::ALL, false).unwrap();

        assert_eq!(report.source_rows, 4);
        assert_eq!(report.target_rows, 3);
        assert_eq!(report.fk_present, 2);
        assert_eq!(report.fk_invalid, 1);
        assert_eq!(report.histogram.count(MatchStrategy::ExactEmail), 1);
        assert_eq!(report.histogram.count(MatchStrategy::ExactId), 1);
        assert_eq!(report.histogram.count(MatchStrategy::Domain), 1);
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].identifier, "2");
        assert_eq!(report.fixed, 0);
    }

    #[test]
    fn fix_fills_missing_and_invalid_keys_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let step = config.step("users").unwrap();
        let report = validate(&config, step, &ManualOverrides::new(), StrategySet::ALL, true).unwrap();

        assert_eq!(report.fixed, 2);
        assert_eq!(report.rows[0].fixed_foreign_key.as_deref(), Some("11"));
        assert_eq!(report.rows[3].fixed_foreign_key.as_deref(), Some("12"));
        assert_eq!(report.rows[1].fixed_foreign_key, None);
        assert_eq!(std::fs::read_to_string(dir.path().join("users.sql")).unwrap(), USERS);
    }

    #[test]
    fn manual_override_alone_never_fixes() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let step = config.step("users").unwrap();
        let mut overrides = ManualOverrides::new();
        overrides.insert("someone@gmail.com", "10");
        let report = validate(&config, step, &overrides, StrategySet::ALL, true).unwrap();

        assert_eq!(report.rows[1].result.strategy, MatchStrategy::Manual);
        assert_eq!(report.rows[1].fixed_foreign_key, None);
    }

    #[test]
    fn all_linked_steps_are_stateless() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let first = validate_all(&config, &ManualOverrides::new(), StrategySet::ALL, true).unwrap();
        let second = validate_all(&config, &ManualOverrides::new(), StrategySet::ALL, true).unwrap();

        let names: Vec<_> = first.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(names, vec!["users"]);
        assert_eq!(first[0].fixed, second[0].fixed);
        assert_eq!(first[0].histogram, second[0].histogram);
        assert!(!dir.path().join("relink.db").exists());
    }

    #[test]
    fn missing_target_dump() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        std::fs::remove_file(dir.path().join("companies.sql")).unwrap();
        let step = config.step("users").unwrap();
        let err = validate(&config, step, &ManualOverrides::new(), StrategySet::ALL, false).unwrap_err();
        assert!(matches!(err, EngineError::MissingDump { .. }));
    }
}
