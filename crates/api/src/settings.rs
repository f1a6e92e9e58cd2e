//! Host-advertised settings.

use ballast_primitives::Currency;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Settings a host advertises over its settings RPC.
///
/// One snapshot of these is attached to every host entry; the scanner
/// refreshes it on each successful probe. All prices are in base units:
/// storage and collateral per byte per block, bandwidth per byte, the
/// contract price as a flat fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Price per byte per block of stored data.
    pub storage_price: Currency,
    /// Collateral the host stakes per byte per block.
    pub collateral: Currency,
    /// Most collateral the host will lock into a single contract.
    pub max_collateral: Currency,
    /// Flat fee for forming a contract.
    pub contract_price: Currency,
    /// Price per uploaded byte.
    pub upload_bandwidth_price: Currency,
    /// Price per downloaded byte.
    pub download_bandwidth_price: Currency,
    /// Unsold storage, in bytes.
    pub remaining_storage: u64,
    /// Total advertised storage, in bytes.
    pub total_storage: u64,
    /// Protocol version the host speaks.
    pub version: Version,
    /// Whether the host is taking new contracts.
    pub accepting_contracts: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            storage_price: Currency::ZERO,
            collateral: Currency::ZERO,
            max_collateral: Currency::ZERO,
            contract_price: Currency::ZERO,
            upload_bandwidth_price: Currency::ZERO,
            download_bandwidth_price: Currency::ZERO,
            remaining_storage: 0,
            total_storage: 0,
            version: Version::new(0, 4, 0),
            accepting_contracts: false,
        }
    }
}

impl HostSettings {
    /// Sanity-check the advertised values.
    ///
    /// Hosts control these numbers, so inconsistencies are data (the host is
    /// misconfigured or lying), not errors; a false return demotes the entry
    /// instead of rejecting it.
    pub fn is_consistent(&self) -> bool {
        self.remaining_storage <= self.total_storage
    }
}
