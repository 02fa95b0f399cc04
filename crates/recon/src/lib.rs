//! `relink-recon` - Multi-strategy entity reconciliation.
//!
//! Pure crate: receives canonicalized rows and a target index, returns match
//! results. No IO beyond the types it borrows from `relink-io`.

pub mod alias;
pub mod error;
pub mod evidence;
pub mod index;
pub mod matcher;
pub mod model;
pub mod normalize;

pub use alias::{columns, AliasTable, CanonicalRow};
pub use error::ReconError;
pub use evidence::{compute_histogram, MatchHistogram};
pub use index::{DomainHit, TargetIndex, TargetRecord};
pub use matcher::{reconcile, reconcile_all, Reconciler};
pub use model::{
    Candidate, ConfidenceTier, MatchResult, MatchStrategy, StrategySet, UnmatchedReason,
};
pub use normalize::FreeDomains;
