//! The seven-factor host weight function.
//!
//! Pure and deterministic: `(entry, allowance, usage, height) -> Weight`.
//! Each factor is a dimensionless non-negative float capturing one failure
//! mode; the total weight is the base weight times the product of all seven,
//! truncated toward zero and clamped to at least one so the host tree stays
//! well-formed. Multiplicative composition means a host must be acceptable
//! on every axis to win, and no single axis can dominate alone.

use std::sync::LazyLock;

use ballast_api::{Allowance, HostScoreBreakdown};
use ballast_primitives::{BlockHeight, Currency, NetworkParams, Weight};
use tracing::warn;

use crate::entry::HostEntry;

/// Base weight. Most factor products are far below one, so the base is set
/// very large to keep the integer weights meaningfully distinct.
pub static BASE_WEIGHT: LazyLock<Weight> = LazyLock::new(|| Weight::ten_pow(80));

/// Exponent applied to the price ratio. The weight is effectively divided by
/// the price this many times.
pub const PRICE_EXPONENT: f64 = 5.0;

/// Exponent for the small-collateral regime. Set above the price exponent so
/// collateral outweighs price when collateral is scarce relative to the
/// allowance.
pub const COLLATERAL_EXP_SMALL: f64 = PRICE_EXPONENT + 0.5;

/// Exponent for the large-collateral regime. Sublinear so there is no
/// overpreference for collateral once it is large relative to the allowance.
pub const COLLATERAL_EXP_LARGE: f64 = 0.65;

/// Bytes in a terabyte times the blocks in a month.
pub const TB_MONTH: u64 = 4_032 * 1_000_000_000_000;

/// Redundancy assumed on reads when folding the download price into the
/// per-byte-block total.
pub const READ_REDUNDANCY: u64 = 3;

/// The bar for "essentially free": prices below one coin per terabyte-month
/// no longer gain an advantage, which blunts Sybil hosts advertising zero.
pub static MIN_TOTAL_PRICE: LazyLock<Currency> =
    LazyLock::new(|| Currency::COIN / TB_MONTH);

/// Normalization divisor applied to currency values before they are downcast
/// to doubles, keeping them within representable range.
pub static PRICE_DIV_NORM: LazyLock<Currency> =
    LazyLock::new(|| Currency::COIN / 100_000 / TB_MONTH);

/// Expected usage of a contract, the denominators of the price and
/// collateral normalizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Bytes of data expected in one contract.
    pub expected_storage: u64,
    /// Expected blocks between complete re-uploads.
    pub expected_upload_frequency: u64,
    /// Expected blocks between complete downloads.
    pub expected_download_frequency: u64,
}

impl Default for Usage {
    fn default() -> Self {
        Self {
            expected_storage: 25_000_000_000,
            expected_upload_frequency: 24_192,
            expected_download_frequency: 12_096,
        }
    }
}

impl Usage {
    /// Derive usage from an allowance, falling back to defaults for zero
    /// fields.
    pub fn from_allowance(allowance: &Allowance) -> Self {
        let defaults = Self::default();
        Self {
            expected_storage: if allowance.expected_storage == 0 {
                defaults.expected_storage
            } else {
                allowance.expected_storage
            },
            expected_upload_frequency: if allowance.expected_upload == 0 {
                defaults.expected_upload_frequency
            } else {
                allowance.expected_upload
            },
            expected_download_frequency: if allowance.expected_download == 0 {
                defaults.expected_download_frequency
            } else {
                allowance.expected_download
            },
        }
    }
}

/// Everything the weight function needs besides the entry itself.
#[derive(Debug, Clone)]
pub struct WeightContext {
    pub allowance: Allowance,
    pub usage: Usage,
    pub params: NetworkParams,
    pub current_height: BlockHeight,
}

impl WeightContext {
    /// Build a context; usage is derived from the allowance.
    pub fn new(allowance: Allowance, params: NetworkParams, current_height: BlockHeight) -> Self {
        let usage = Usage::from_allowance(&allowance);
        Self {
            allowance,
            usage,
            params,
            current_height,
        }
    }

    /// The full weight of an entry.
    pub fn weight(&self, entry: &HostEntry) -> Weight {
        let product = self.collateral_factor(entry)
            * self.interaction_factor(entry)
            * self.age_factor(entry)
            * self.price_factor(entry)
            * self.storage_remaining_factor(entry)
            * self.uptime_factor(entry)
            * self.version_factor(entry);
        finalize(product)
    }

    /// Factor decomposition for display, plus the final score.
    ///
    /// The conversion rate is filled in by the caller, which knows the
    /// total score of the active set.
    pub fn breakdown(&self, entry: &HostEntry) -> HostScoreBreakdown {
        HostScoreBreakdown {
            score: self.weight(entry),
            conversion_rate: 0.0,
            age_adjustment: self.age_factor(entry),
            collateral_adjustment: self.collateral_factor(entry),
            interaction_adjustment: self.interaction_factor(entry),
            price_adjustment: self.price_factor(entry),
            storage_remaining_adjustment: self.storage_remaining_factor(entry),
            uptime_adjustment: self.uptime_factor(entry),
            version_adjustment: self.version_factor(entry),
        }
    }

    /// Estimated weight for a host the renter has no history with: age and
    /// uptime are assumed perfect.
    pub fn estimate_breakdown(&self, entry: &HostEntry) -> HostScoreBreakdown {
        let product = self.collateral_factor(entry)
            * self.price_factor(entry)
            * self.storage_remaining_factor(entry)
            * self.version_factor(entry);
        HostScoreBreakdown {
            score: finalize(product),
            conversion_rate: 0.0,
            age_adjustment: 1.0,
            collateral_adjustment: self.collateral_factor(entry),
            interaction_adjustment: 1.0,
            price_adjustment: self.price_factor(entry),
            storage_remaining_adjustment: self.storage_remaining_factor(entry),
            uptime_adjustment: 1.0,
            version_adjustment: self.version_factor(entry),
        }
    }

    /// Collateral factor: a two-regime exponentiation around an
    /// allowance-derived cutoff.
    ///
    /// Below the cutoff the score collapses with [`COLLATERAL_EXP_SMALL`];
    /// above it the reward grows sublinearly. The host's collateral is
    /// capped where its max-collateral would saturate halfway through the
    /// expected contract, so an extravagant per-byte price backed by a tiny
    /// max buys nothing.
    pub fn collateral_factor(&self, entry: &HostEntry) -> f64 {
        let hosts = self.allowance.hosts.max(1);
        let period = self.allowance.period.max(1);
        let expected_storage = self.usage.expected_storage.max(1);

        let saturated_collateral = entry.settings.max_collateral / 2 / period / expected_storage;
        let host_collateral = entry.settings.collateral.min(saturated_collateral);

        let mut cutoff = self.allowance.funds / hosts / period / expected_storage / 3;
        if cutoff < host_collateral {
            // The collateral exceeds the point where more money stops being
            // a reliability signal; from here the smallWeight term is
            // computed from the actual collateral and the ratio pins to one.
            cutoff = host_collateral;
        }

        let collateral64 = host_collateral
            .div_currency(*PRICE_DIV_NORM)
            .to_u64_saturating();
        let cutoff64 = cutoff
            .div_currency(*PRICE_DIV_NORM)
            .to_u64_saturating()
            .max(1);

        let ratio = collateral64 as f64 / cutoff64 as f64;
        let small_weight = (cutoff64 as f64).powf(COLLATERAL_EXP_SMALL);
        let large_weight = ratio.powf(COLLATERAL_EXP_LARGE);
        small_weight * large_weight
    }

    /// Price factor: `(min_total_price / total_price)^PRICE_EXPONENT`.
    ///
    /// The four prices are folded into a single per-byte-block figure:
    /// contract price amortized over the expected storage and period,
    /// bandwidth prices over their expected frequencies, downloads divided
    /// by the assumed read redundancy.
    pub fn price_factor(&self, entry: &HostEntry) -> f64 {
        let period = self.allowance.period.max(1);
        let expected_storage = self.usage.expected_storage.max(1);
        let upload_freq = self.usage.expected_upload_frequency.max(1);
        let download_freq = self.usage.expected_download_frequency.max(1);

        let adjusted_contract = entry.settings.contract_price / period / expected_storage;
        let adjusted_upload = entry.settings.upload_bandwidth_price / upload_freq;
        let adjusted_download =
            entry.settings.download_bandwidth_price / download_freq / READ_REDUNDANCY;

        let mut total_price = entry.settings.storage_price
            + adjusted_contract
            + adjusted_upload
            + adjusted_download;
        if total_price < *MIN_TOTAL_PRICE {
            total_price = *MIN_TOTAL_PRICE;
        }

        let base = MIN_TOTAL_PRICE
            .div_currency(*PRICE_DIV_NORM)
            .to_u64_saturating() as f64;
        let actual = total_price
            .div_currency(*PRICE_DIV_NORM)
            .to_u64_saturating() as f64;

        (base / actual).powf(PRICE_EXPONENT)
    }

    /// Remaining-storage factor: halves at each threshold crossed, up to a
    /// 4096x penalty for a nearly full host.
    pub fn storage_remaining_factor(&self, entry: &HostEntry) -> f64 {
        const STORAGE_STEPS: [u64; 12] = [200, 150, 100, 80, 40, 20, 15, 10, 5, 3, 2, 1];

        let required = self.params.required_storage;
        let remaining = entry.settings.remaining_storage;
        let mut base = 1.0;
        for multiple in STORAGE_STEPS {
            if remaining < multiple.saturating_mul(required) {
                base /= 2.0;
            }
        }
        base
    }

    /// Age factor: new hosts are heavily penalized, mature hosts score one.
    pub fn age_factor(&self, entry: &HostEntry) -> f64 {
        const AGE_STEPS: [(u64, f64); 8] = [
            (12_000, 2.0 / 3.0),
            (6_000, 1.0 / 2.0),
            (4_000, 1.0 / 2.0),
            (2_000, 1.0 / 2.0),
            (1_000, 1.0 / 3.0),
            (576, 1.0 / 3.0),
            (288, 1.0 / 3.0),
            (144, 1.0 / 3.0),
        ];

        let mut base = 1.0;
        if self.current_height >= entry.first_seen_height {
            let age = self.current_height - entry.first_seen_height;
            for (below, multiplier) in AGE_STEPS {
                if age < below {
                    base *= multiplier;
                }
            }
        }
        base
    }

    /// Uptime factor from the scan history.
    ///
    /// Fewer than three scans use fixed optimistic values. Otherwise each
    /// interval between consecutive scans is attributed to up or down time
    /// by the earlier scan's success bit, seeded with the historic
    /// counters. 98% uptime and better count as perfect; short histories
    /// are floored so a single early failure cannot crater a new host.
    pub fn uptime_factor(&self, entry: &HostEntry) -> f64 {
        let scans = &entry.scan_history;
        match scans.len() {
            0 => return 0.25,
            1 => return if scans[0].success { 0.75 } else { 0.25 },
            2 => {
                return match (scans[0].success, scans[1].success) {
                    (true, true) => 0.85,
                    (true, false) | (false, true) => 0.50,
                    (false, false) => 0.05,
                };
            }
            _ => {}
        }

        let mut uptime = entry.historic_uptime_secs;
        let mut downtime = entry.historic_downtime_secs;
        let mut recent_time = scans[0].timestamp;
        let mut recent_success = scans[0].success;
        for scan in &scans[1..] {
            if scan.timestamp < recent_time {
                // The coordinator rejects out-of-order appends, so this only
                // fires on a corrupted journal replay.
                warn!(host = %entry.public_key, "scan history out of order, ignoring entry");
                continue;
            }
            let interval = scan.timestamp - recent_time;
            if recent_success {
                uptime += interval;
            } else {
                downtime += interval;
            }
            recent_time = scan.timestamp;
            recent_success = scan.success;
        }
        if uptime == 0 && downtime == 0 {
            return 0.001;
        }

        // 98% and 100% uptime are valued the same.
        let mut uptime_ratio = uptime as f64 / (uptime + downtime) as f64;
        if uptime_ratio > 0.98 {
            uptime_ratio = 0.98;
        }
        uptime_ratio += 0.02;

        // Cap the downtime a short history can claim.
        let allowed_downtime = 0.03 * scans.len() as f64;
        if uptime_ratio < 1.0 - allowed_downtime {
            uptime_ratio = 1.0 - allowed_downtime;
        }

        // Penalties ramp extremely quickly as uptime falls from 98%:
        // 95% ~ 0.83, 90% ~ 0.26, 80% ~ 0.001.
        let exp = 200.0 * (1.0 - uptime_ratio).min(0.30);
        uptime_ratio.powf(exp)
    }

    /// Interaction factor: `((s+30)/(s+30+f+1))^15`.
    ///
    /// The prior of thirty successes and one failure keeps new hosts from
    /// being punished before any contract history exists.
    pub fn interaction_factor(&self, entry: &HostEntry) -> f64 {
        let successes = (entry.historic_successful_interactions + 30) as f64;
        let failures = (entry.historic_failed_interactions + 1) as f64;
        let ratio = successes / (successes + failures);
        ratio.powi(15)
    }

    /// Version factor from the injected penalty table. Pre-hardfork hosts
    /// collapse to the smallest representable positive float.
    pub fn version_factor(&self, entry: &HostEntry) -> f64 {
        let version = &entry.settings.version;
        if *version < self.params.hardfork_version {
            return f64::MIN_POSITIVE;
        }
        let mut base = 1.0;
        for penalty in &self.params.version_penalties {
            if *version < penalty.below {
                base *= penalty.factor;
            }
        }
        base
    }
}

/// Fold the factor product into the base weight, truncating toward zero and
/// clamping to one: a zero weight is unrepresentable in the host tree.
fn finalize(factor_product: f64) -> Weight {
    let weight = BASE_WEIGHT.mul_float(factor_product);
    if weight.is_zero() { Weight::ONE } else { weight }
}
