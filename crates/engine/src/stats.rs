use serde::Serialize;

/// Counters for one step run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub attempted: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Rows whose link could not be resolved. Counted apart from errors.
    pub unmatched: usize,
    pub parse_warnings: usize,
    pub errors_detail: Vec<RowError>,
}

impl StepStats {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn merge(&mut self, other: &StepStats) {
        self.attempted += other.attempted;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.unmatched += other.unmatched;
        self.parse_warnings += other.parse_warnings;
        self.errors_detail.extend(other.errors_detail.iter().cloned());
    }
}

/// One failed row, with enough context to find it in the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub old_id: String,
    pub display_name: String,
    /// `line N, tuple M` of the owning INSERT statement.
    pub statement: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { stats: StepStats },
    Aborted { reason: String },
    Skipped { blocked_by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Everything ran, but some rows went to the unmatched report.
    Warning,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
}

impl RunSummary {
    pub fn push(&mut self, name: impl Into<String>, outcome: StepOutcome) {
        self.steps.push(StepReport {
            name: name.into(),
            outcome,
        });
    }

    /// Counters summed over completed steps.
    pub fn totals(&self) -> StepStats {
        let mut totals = StepStats::default();
        for report in &self.steps {
            if let StepOutcome::Completed { stats } = &report.outcome {
                totals.merge(stats);
            }
        }
        totals
    }

    pub fn aborted(&self) -> usize {
        self.steps
            .iter()
            .filter(|r| !matches!(r.outcome, StepOutcome::Completed { .. }))
            .count()
    }

    pub fn status(&self) -> RunStatus {
        let totals = self.totals();
        if self.aborted() > 0 || totals.errors > 0 {
            RunStatus::Failed
        } else if totals.unmatched > 0 {
            RunStatus::Warning
        } else {
            RunStatus::Success
        }
    }
}
