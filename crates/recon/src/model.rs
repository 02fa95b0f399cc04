use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// How a source row was linked to a target. Declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Manual,
    ExactId,
    ExactEmail,
    Domain,
    NormalizedName,
    None,
}

impl MatchStrategy {
    /// Every variant, priority order, `None` last.
    pub const ALL: [MatchStrategy; 6] = [
        Self::Manual,
        Self::ExactId,
        Self::ExactEmail,
        Self::Domain,
        Self::NormalizedName,
        Self::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::ExactId => "exact_id",
            Self::ExactEmail => "exact_email",
            Self::Domain => "domain",
            Self::NormalizedName => "normalized_name",
            Self::None => "none",
        }
    }

    pub fn confidence(&self) -> ConfidenceTier {
        match self {
            Self::Manual | Self::ExactId => ConfidenceTier::Certain,
            Self::ExactEmail => ConfidenceTier::High,
            Self::Domain => ConfidenceTier::Medium,
            Self::NormalizedName => ConfidenceTier::Low,
            Self::None => ConfidenceTier::None,
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Certain,
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceTier {
    /// Tiers trusted enough to fill a missing foreign key.
    pub fn is_confident(&self) -> bool {
        matches!(self, Self::Certain | Self::High | Self::Medium)
    }
}

/// Automatic strategies enabled for a run. Manual overrides are not part of
/// the set: they are always consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategySet {
    pub exact_id: bool,
    pub email: bool,
    pub domain: bool,
    pub name: bool,
}

impl StrategySet {
    pub const ALL: StrategySet = StrategySet {
        exact_id: true,
        email: true,
        domain: true,
        name: true,
    };

    pub const NONE: StrategySet = StrategySet {
        exact_id: false,
        email: false,
        domain: false,
        name: false,
    };

    pub fn only(strategy: MatchStrategy) -> Self {
        let mut set = Self::NONE;
        match strategy {
            MatchStrategy::ExactId => set.exact_id = true,
            MatchStrategy::ExactEmail => set.email = true,
            MatchStrategy::Domain => set.domain = true,
            MatchStrategy::NormalizedName => set.name = true,
            MatchStrategy::Manual | MatchStrategy::None => {}
        }
        set
    }

    pub fn contains(&self, strategy: MatchStrategy) -> bool {
        match strategy {
            MatchStrategy::Manual => true,
            MatchStrategy::ExactId => self.exact_id,
            MatchStrategy::ExactEmail => self.email,
            MatchStrategy::Domain => self.domain,
            MatchStrategy::NormalizedName => self.name,
            MatchStrategy::None => false,
        }
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for StrategySet {
    type Err = ReconError;

    /// Command-line names: `uuid`, `email`, `domain`, `name`, `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::ALL),
            "uuid" | "id" | "exact_id" => Ok(Self::only(MatchStrategy::ExactId)),
            "email" | "exact_email" => Ok(Self::only(MatchStrategy::ExactEmail)),
            "domain" => Ok(Self::only(MatchStrategy::Domain)),
            "name" | "normalized_name" => Ok(Self::only(MatchStrategy::NormalizedName)),
            other => Err(ReconError::UnknownStrategy(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a row ended up in the unmatched report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    NoMatchFound,
    /// Several organization targets share the row's e-mail domain.
    AmbiguousDomain,
    /// A target was found but has no mapping yet, so there is nothing to link to.
    TargetNotMigrated,
    /// The source row carries no legacy identifier.
    MissingIdentifier,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatchFound => "no_match_found",
            Self::AmbiguousDomain => "ambiguous_domain",
            Self::TargetNotMigrated => "target_not_migrated",
            Self::MissingIdentifier => "missing_identifier",
        }
    }
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strategy's answer for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub strategy: MatchStrategy,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub strategy: MatchStrategy,
    pub target_id: Option<String>,
    pub confidence: ConfidenceTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnmatchedReason>,
}

impl MatchResult {
    pub fn found(strategy: MatchStrategy, target_id: impl Into<String>) -> Self {
        Self {
            strategy,
            target_id: Some(target_id.into()),
            confidence: strategy.confidence(),
            reason: None,
        }
    }

    pub fn none(reason: UnmatchedReason) -> Self {
        Self {
            strategy: MatchStrategy::None,
            target_id: None,
            confidence: ConfidenceTier::None,
            reason: Some(reason),
        }
    }

    pub fn is_match(&self) -> bool {
        self.target_id.is_some()
    }
}
