//! Score decomposition exposed to the control plane.

use ballast_primitives::Weight;
use serde::{Deserialize, Serialize};

/// The seven weight factors and the final score of one host.
///
/// Each adjustment is the dimensionless factor that multiplies the base
/// weight; the product of all seven times the base weight is `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostScoreBreakdown {
    /// Final integer score as stored in the host tree.
    pub score: Weight,
    /// Estimated percentage of random draws this host wins, scaled so a
    /// median host reads about 50.
    pub conversion_rate: f64,

    /// Host age factor.
    pub age_adjustment: f64,
    /// Collateral factor.
    pub collateral_adjustment: f64,
    /// Contract-level interaction history factor.
    pub interaction_adjustment: f64,
    /// Price factor.
    pub price_adjustment: f64,
    /// Remaining-storage factor.
    pub storage_remaining_adjustment: f64,
    /// Scan-history uptime factor.
    pub uptime_adjustment: f64,
    /// Advertised-version factor.
    pub version_adjustment: f64,
}
