//! The renter's view of one storage contract.

use ballast_api::{ContractId, FormedContract};
use ballast_primitives::{BlockHeight, Currency, HostPublicKey};
use serde::{Deserialize, Serialize};

/// Utility flags driving the uploader and the renewal logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractUtility {
    /// New data may be uploaded into this contract.
    pub good_for_upload: bool,
    /// The contract will be renewed with the same host.
    pub good_for_renew: bool,
}

/// Lifecycle stage of a contract at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractState {
    /// In its working period and renewable.
    Active,
    /// Inside the renew window, renewal pending.
    Renewing,
    /// Will not be renewed; waiting for natural expiry.
    Expiring,
    /// Past its end height.
    Expired,
    /// Operator-cancelled.
    Cancelled,
}

/// One storage contract and its spending so far.
///
/// Spending fields are updated by upload/download accounting callbacks from
/// the outer node; the contractor itself only moves funds at formation and
/// renewal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// On-chain contract id.
    pub id: ContractId,
    /// Host on the other side.
    pub host_public_key: HostPublicKey,
    /// First height the contract is valid.
    pub start_height: BlockHeight,
    /// Height the contract expires.
    pub end_height: BlockHeight,
    /// Total paid out of the wallet to create the contract, fees included.
    pub total_cost: Currency,
    /// Renter funds still spendable inside the contract.
    pub renter_funds: Currency,
    /// Spent on storage so far.
    pub storage_spending: Currency,
    /// Spent on uploads so far.
    pub upload_spending: Currency,
    /// Spent on downloads so far.
    pub download_spending: Currency,
    /// Transaction fees paid at formation/renewal.
    pub fees: Currency,
    /// Utility flags.
    pub utility: ContractUtility,
    /// Number of the most recent revision the renter has signed.
    pub last_revision: u64,
    /// Set by operator cancellation; the contract archives next cycle.
    pub cancelled: bool,
}

impl Contract {
    /// Build the renter-side record for a freshly formed contract.
    pub fn from_formed(host_public_key: HostPublicKey, formed: &FormedContract) -> Self {
        Self {
            id: formed.id,
            host_public_key,
            start_height: formed.start_height,
            end_height: formed.end_height,
            total_cost: formed.total_cost,
            renter_funds: formed.renter_funds,
            storage_spending: Currency::ZERO,
            upload_spending: Currency::ZERO,
            download_spending: Currency::ZERO,
            fees: formed.fees,
            utility: ContractUtility {
                good_for_upload: true,
                good_for_renew: true,
            },
            last_revision: 0,
            cancelled: false,
        }
    }

    /// Lifecycle stage at `height` with the given renew window.
    pub fn state(&self, height: BlockHeight, renew_window: BlockHeight) -> ContractState {
        if self.cancelled {
            return ContractState::Cancelled;
        }
        if height >= self.end_height {
            return ContractState::Expired;
        }
        let window_start = self.end_height.saturating_sub(renew_window);
        if height >= window_start {
            if self.utility.good_for_renew {
                ContractState::Renewing
            } else {
                ContractState::Expiring
            }
        } else if self.utility.good_for_renew {
            ContractState::Active
        } else {
            ContractState::Expiring
        }
    }
}
