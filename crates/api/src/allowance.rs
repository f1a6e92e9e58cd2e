//! Renter allowance.

use ballast_primitives::{BlockHeight, Currency};
use serde::{Deserialize, Serialize};

/// The renter's declared budget and target portfolio over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allowance {
    /// Total funds the contractor may commit across the portfolio.
    pub funds: Currency,
    /// Target number of hosts under contract.
    pub hosts: u64,
    /// Blocks a contract is expected to last.
    pub period: BlockHeight,
    /// Blocks before end-height during which renewal is attempted.
    pub renew_window: BlockHeight,
    /// Bytes of data expected under contract per host.
    pub expected_storage: u64,
    /// Expected blocks between complete re-uploads of the stored data.
    pub expected_upload: u64,
    /// Expected blocks between complete downloads of the stored data.
    pub expected_download: u64,
    /// Erasure-coding redundancy the uploader maintains.
    pub expected_redundancy: f64,
    /// Require the portfolio to span distinct /24 (IPv4) and /54 (IPv6)
    /// subnets.
    pub ip_violation_check: bool,
}

impl Default for Allowance {
    fn default() -> Self {
        Self {
            funds: Currency::from_coins(500),
            hosts: 50,
            period: 12_096,
            renew_window: 6_048,
            expected_storage: 25_000_000_000,
            expected_upload: 24_192,
            expected_download: 12_096,
            expected_redundancy: 3.0,
            ip_violation_check: false,
        }
    }
}

impl Allowance {
    /// Returns true if the allowance asks for an active portfolio.
    pub fn is_active(&self) -> bool {
        self.hosts > 0 && !self.funds.is_zero() && self.period > 0
    }

    /// Replace zero fields with defaults.
    ///
    /// The control plane may set only the fields it cares about; a zero
    /// renew window in particular defaults to half the period so renewals
    /// start at the contract midpoint.
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.hosts == 0 {
            self.hosts = defaults.hosts;
        }
        if self.period == 0 {
            self.period = defaults.period;
        }
        if self.renew_window == 0 {
            self.renew_window = self.period / 2;
        }
        if self.expected_storage == 0 {
            self.expected_storage = defaults.expected_storage;
        }
        if self.expected_upload == 0 {
            self.expected_upload = defaults.expected_upload;
        }
        if self.expected_download == 0 {
            self.expected_download = defaults.expected_download;
        }
        if self.expected_redundancy <= 0.0 {
            self.expected_redundancy = defaults.expected_redundancy;
        }
        self
    }
}
