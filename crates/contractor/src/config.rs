//! Contractor configuration.

use std::collections::HashSet;
use std::time::Duration;

use ballast_primitives::HostPublicKey;

/// Fraction of the per-host allowance committed into one new contract; the
/// rest is held back for renewals and top-ups through the period.
pub const INITIAL_FUNDING_DIVISOR: u64 = 3;

/// A contract whose remaining funds fall below `total_cost` divided by this
/// is no longer good for upload.
pub const LOW_FUNDS_DIVISOR: u64 = 20;

/// Tuning for the contractor loop.
#[derive(Debug, Clone)]
pub struct ContractorConfig {
    /// Deadline for one contract formation or renewal RPC (default: 3
    /// minutes).
    pub formation_timeout: Duration,
    /// Total formation attempts per maintenance cycle, across retries
    /// (default: 25).
    pub formation_retry_budget: usize,
    /// A host must score at least the median active score divided by this
    /// to stay renewable (default: 100).
    pub score_safety_factor: u64,
    /// Hosts never contracted with, regardless of score.
    pub blacklist: HashSet<HostPublicKey>,
}

impl Default for ContractorConfig {
    fn default() -> Self {
        Self {
            formation_timeout: Duration::from_secs(3 * 60),
            formation_retry_budget: 25,
            score_safety_factor: 100,
            blacklist: HashSet::new(),
        }
    }
}
