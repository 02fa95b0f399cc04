use log::debug;
use relink_io::overrides::ManualOverrides;

use crate::alias::{columns, CanonicalRow};
use crate::index::{DomainHit, TargetIndex};
use crate::model::{Candidate, MatchResult, MatchStrategy, StrategySet, UnmatchedReason};
use crate::normalize;

/// Strategy chain for one linked step: source rows carrying `foreign_key`
/// are matched against the index of the target entity.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    index: &'a TargetIndex,
    overrides: &'a ManualOverrides,
    strategies: StrategySet,
    foreign_key: &'a str,
}

impl<'a> Reconciler<'a> {
    pub fn new(index: &'a TargetIndex, overrides: &'a ManualOverrides, strategies: StrategySet) -> Self {
        Self {
            index,
            overrides,
            strategies,
            foreign_key: columns::COMPANY_ID,
        }
    }

    pub fn with_foreign_key(mut self, foreign_key: &'a str) -> Self {
        self.foreign_key = foreign_key;
        self
    }

    pub fn foreign_key(&self) -> &str {
        self.foreign_key
    }

    /// First strategy in priority order that produces a target wins.
    pub fn reconcile(&self, row: &CanonicalRow) -> MatchResult {
        let mut ambiguous = false;

        if let Some(target) = self.manual(row) {
            return self.hit(row, MatchStrategy::Manual, target);
        }
        if self.strategies.exact_id {
            if let Some(target) = self.exact_id(row) {
                return self.hit(row, MatchStrategy::ExactId, target);
            }
        }
        if self.strategies.email {
            if let Some(target) = self.exact_email(row) {
                return self.hit(row, MatchStrategy::ExactEmail, target);
            }
        }
        if self.strategies.domain {
            match self.domain(row) {
                DomainHit::Unique(target) => {
                    return self.hit(row, MatchStrategy::Domain, target.to_string());
                }
                DomainHit::Ambiguous(n) => {
                    debug!("line {}: domain shared by {n} targets", row.line);
                    ambiguous = true;
                }
                DomainHit::Miss => {}
            }
        }
        if self.strategies.name {
            if let Some(target) = self.name(row) {
                return self.hit(row, MatchStrategy::NormalizedName, target);
            }
        }

        let reason = if ambiguous {
            UnmatchedReason::AmbiguousDomain
        } else {
            UnmatchedReason::NoMatchFound
        };
        debug!("line {}: unmatched ({reason})", row.line);
        MatchResult::none(reason)
    }

    /// Every enabled strategy's answer, priority order. Ambiguous domains
    /// produce no candidate.
    pub fn reconcile_all(&self, row: &CanonicalRow) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut push = |strategy, target_id: Option<String>| {
            if let Some(target_id) = target_id {
                out.push(Candidate { strategy, target_id });
            }
        };

        push(MatchStrategy::Manual, self.manual(row));
        if self.strategies.exact_id {
            push(MatchStrategy::ExactId, self.exact_id(row));
        }
        if self.strategies.email {
            push(MatchStrategy::ExactEmail, self.exact_email(row));
        }
        if self.strategies.domain {
            if let DomainHit::Unique(target) = self.domain(row) {
                push(MatchStrategy::Domain, Some(target.to_string()));
            }
        }
        if self.strategies.name {
            push(MatchStrategy::NormalizedName, self.name(row));
        }
        out
    }

    fn hit(&self, row: &CanonicalRow, strategy: MatchStrategy, target: String) -> MatchResult {
        debug!("line {}: {strategy} -> {target}", row.line);
        MatchResult::found(strategy, target)
    }

    fn manual(&self, row: &CanonicalRow) -> Option<String> {
        if self.overrides.is_empty() {
            return None;
        }
        let by_email = row
            .text(columns::EMAIL)
            .and_then(|e| self.overrides.get(&e).map(str::to_string));
        by_email.or_else(|| {
            row.text(columns::ID)
                .and_then(|id| self.overrides.get(&id).map(str::to_string))
        })
    }

    fn exact_id(&self, row: &CanonicalRow) -> Option<String> {
        row.reference(self.foreign_key)
            .filter(|fk| self.index.contains_id(fk))
    }

    fn exact_email(&self, row: &CanonicalRow) -> Option<String> {
        let email = row.text(columns::EMAIL).and_then(|e| normalize::email(&e))?;
        self.index.by_email(&email).map(str::to_string)
    }

    fn domain(&self, row: &CanonicalRow) -> DomainHit<'a> {
        match row
            .text(columns::EMAIL)
            .and_then(|e| normalize::email_domain(&e))
        {
            Some(domain) => self.index.by_domain(&domain),
            None => DomainHit::Miss,
        }
    }

    fn name(&self, row: &CanonicalRow) -> Option<String> {
        let first = row.text(columns::FIRST_NAME);
        let last = row.text(columns::LAST_NAME);
        let name = normalize::full_name(first.as_deref(), last.as_deref())?;
        self.index.by_name(&name).map(str::to_string)
    }
}

/// Run the chain with the default `company_id` foreign key.
pub fn reconcile(
    row: &CanonicalRow,
    index: &TargetIndex,
    overrides: &ManualOverrides,
    strategies: StrategySet,
) -> MatchResult {
    Reconciler::new(index, overrides, strategies).reconcile(row)
}

/// Every candidate for `row`, for validate mode.
pub fn reconcile_all(
    row: &CanonicalRow,
    index: &TargetIndex,
    overrides: &ManualOverrides,
    strategies: StrategySet,
) -> Vec<Candidate> {
    Reconciler::new(index, overrides, strategies).reconcile_all(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use crate::model::ConfidenceTier;
    use crate::normalize::FreeDomains;
    use relink_io::dump::parse_str;

    fn canonical(sql: &str, entity_type: &str) -> Vec<CanonicalRow> {
        let aliases = AliasTable::builtin();
        parse_str(sql, entity_type)
            .rows
            .iter()
            .map(|r| aliases.canonicalize(r))
            .collect()
    }

    fn index(sql: &str) -> TargetIndex {
        TargetIndex::build(&canonical(sql, "company"), FreeDomains::default())
    }

    fn user(sql: &str) -> CanonicalRow {
        canonical(sql, "user").remove(0)
    }

    const COMPANIES: &str = "INSERT INTO companies (id, name, email) VALUES \
        (10,'Initech','info@initech.com'),\
        (11,'Acme','contact@acme.io'),\
        (12,'Globex','hello@globex.com');";

    #[test]
    fn exact_email_picks_company_11() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, email, company_id) VALUES (1,'contact@acme.io',NULL);");
        let result = reconcile(&row, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert_eq!(result.strategy, MatchStrategy::ExactEmail);
        assert_eq!(result.target_id.as_deref(), Some("11"));
        assert_eq!(result.confidence, ConfidenceTier::High);
    }

    #[test]
    fn exact_id_beats_email() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, email, company_id) VALUES (1,'contact@acme.io',12);");
        let result = reconcile(&row, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert_eq!(result.strategy, MatchStrategy::ExactId);
        assert_eq!(result.target_id.as_deref(), Some("12"));
    }

    #[test]
    fn manual_beats_exact_id() {
        let idx = index(COMPANIES);
        let mut overrides = ManualOverrides::new();
        overrides.insert("Ann@Example.org", "10");
        let row = user("INSERT INTO users (id, email, company_id) VALUES (1,'ann@example.org',12);");
        let result = reconcile(&row, &idx, &overrides, StrategySet::NONE);
        assert_eq!(result.strategy, MatchStrategy::Manual);
        assert_eq!(result.target_id.as_deref(), Some("10"));
        assert_eq!(result.confidence, ConfidenceTier::Certain);
    }

    #[test]
    fn manual_falls_back_to_source_id() {
        let idx = index(COMPANIES);
        let mut overrides = ManualOverrides::new();
        overrides.insert("u-77", "12");
        let row = user("INSERT INTO users (id, email) VALUES ('U-77','nobody@nowhere.net');");
        let result = reconcile(&row, &idx, &overrides, StrategySet::ALL);
        assert_eq!(result.strategy, MatchStrategy::Manual);
        assert_eq!(result.target_id.as_deref(), Some("12"));
    }

    #[test]
    fn free_domain_is_no_match() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, email, first_name, last_name) VALUES (2,'someone@gmail.com','Some','One');");
        let result = reconcile(&row, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert_eq!(result.strategy, MatchStrategy::None);
        assert_eq!(result.target_id, None);
        assert_eq!(result.reason, Some(UnmatchedReason::NoMatchFound));
    }

    #[test]
    fn domain_match_when_unique() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, email) VALUES (3,'bob@globex.com');");
        let result = reconcile(&row, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert_eq!(result.strategy, MatchStrategy::Domain);
        assert_eq!(result.target_id.as_deref(), Some("12"));
    }

    #[test]
    fn ambiguous_domain_continues_to_name() {
        let idx = index(
            "INSERT INTO companies (id, name, email) VALUES \
             (20,'Acme US','us@acme.io'),(21,'Acme EU','eu@acme.io'),(22,'Jo Park',NULL);",
        );
        let ambiguous = user("INSERT INTO users (id, email) VALUES (4,'kim@acme.io');");
        let result = reconcile(&ambiguous, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert_eq!(result.reason, Some(UnmatchedReason::AmbiguousDomain));

        let named = user(
            "INSERT INTO users (id, email, first_name, last_name) VALUES (5,'jo@acme.io','Jo','PARK');",
        );
        let result = reconcile(&named, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert_eq!(result.strategy, MatchStrategy::NormalizedName);
        assert_eq!(result.target_id.as_deref(), Some("22"));
    }

    #[test]
    fn zero_foreign_key_is_absent() {
        let idx = index("INSERT INTO companies (id, name) VALUES (0,'Placeholder');");
        let row = user("INSERT INTO users (id, company_id) VALUES (6,0);");
        let result = reconcile(&row, &idx, &ManualOverrides::new(), StrategySet::ALL);
        assert!(!result.is_match());
    }

    #[test]
    fn strategy_set_restricts_chain() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, email, company_id) VALUES (1,'contact@acme.io',12);");
        let email_only: StrategySet = "email".parse().unwrap();
        let result = reconcile(&row, &idx, &ManualOverrides::new(), email_only);
        assert_eq!(result.strategy, MatchStrategy::ExactEmail);
    }

    #[test]
    fn all_candidates_listed() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, email, company_id) VALUES (1,'contact@acme.io',12);");
        let candidates = reconcile_all(&row, &idx, &ManualOverrides::new(), StrategySet::ALL);
        let strategies: Vec<_> = candidates.iter().map(|c| c.strategy).collect();
        assert_eq!(
            strategies,
            vec![MatchStrategy::ExactId, MatchStrategy::ExactEmail, MatchStrategy::Domain]
        );
        assert_eq!(candidates[0].target_id, "12");
        assert_eq!(candidates[1].target_id, "11");
    }

    #[test]
    fn custom_foreign_key() {
        let idx = index(COMPANIES);
        let row = user("INSERT INTO users (id, employer) VALUES (1,10);");
        let overrides = ManualOverrides::new();
        let result = Reconciler::new(&idx, &overrides, StrategySet::ALL)
            .with_foreign_key("employer")
            .reconcile(&row);
        assert_eq!(result.strategy, MatchStrategy::ExactId);
        assert_eq!(result.target_id.as_deref(), Some("10"));
    }
}
