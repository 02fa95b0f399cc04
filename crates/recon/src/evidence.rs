use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Candidate, MatchResult, MatchStrategy};

/// Counts per winning strategy, plus every strategy that produced a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchHistogram {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Winning strategy per row (`none` for unmatched rows).
    pub by_strategy: BTreeMap<MatchStrategy, usize>,
    /// How often each strategy found something, winning or not.
    pub strategy_hits: BTreeMap<MatchStrategy, usize>,
}

impl MatchHistogram {
    pub fn record(&mut self, result: &MatchResult) {
        self.total += 1;
        if result.is_match() {
            self.matched += 1;
        } else {
            self.unmatched += 1;
        }
        *self.by_strategy.entry(result.strategy).or_insert(0) += 1;
    }

    pub fn record_candidates(&mut self, candidates: &[Candidate]) {
        for c in candidates {
            *self.strategy_hits.entry(c.strategy).or_insert(0) += 1;
        }
    }

    pub fn count(&self, strategy: MatchStrategy) -> usize {
        self.by_strategy.get(&strategy).copied().unwrap_or(0)
    }
}

/// Histogram over a finished batch of results.
pub fn compute_histogram(results: &[MatchResult]) -> MatchHistogram {
    let mut histogram = MatchHistogram::default();
    for r in results {
        histogram.record(r);
    }
    histogram
}
