//! Host RPC capability.

use std::time::Duration;

use alloy_primitives::B256;
use ballast_primitives::{BlockHeight, Currency, HostPublicKey};
use serde::{Deserialize, Serialize};

use crate::{HostSettings, RpcError, async_trait};

/// Identifier of an on-chain storage contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContractId(pub B256);

impl ContractId {
    /// An id with every byte set to `n`, for tests.
    pub fn repeat_byte(n: u8) -> Self {
        Self(B256::repeat_byte(n))
    }
}

/// Terms the renter proposes when forming or renewing a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    /// Host the contract is addressed to.
    pub host_public_key: HostPublicKey,
    /// Funds the renter locks into the contract.
    pub renter_funds: Currency,
    /// Collateral the host is asked to lock.
    pub host_collateral: Currency,
    /// First height at which the contract is valid.
    pub start_height: BlockHeight,
    /// Height at which the contract expires.
    pub end_height: BlockHeight,
}

/// A contract as returned by a successful form or renew RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormedContract {
    /// On-chain id of the new contract.
    pub id: ContractId,
    /// Total cost to the wallet, fees included.
    pub total_cost: Currency,
    /// Transaction fees paid on top of the locked funds.
    pub fees: Currency,
    /// Renter funds available for spending inside the contract.
    pub renter_funds: Currency,
    /// First valid height.
    pub start_height: BlockHeight,
    /// Expiry height.
    pub end_height: BlockHeight,
}

/// Outbound RPCs to a single host.
///
/// Every call carries an explicit timeout; implementations must not block
/// past it. The core treats all failures as data about the host.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait HostRpcClient: Send + Sync + 'static {
    /// Fetch the host's advertised settings.
    async fn settings(&self, addr: &str, timeout: Duration) -> Result<HostSettings, RpcError>;

    /// Negotiate a new contract.
    async fn form_contract(
        &self,
        addr: &str,
        terms: &ContractTerms,
        timeout: Duration,
    ) -> Result<FormedContract, RpcError>;

    /// Renew an existing contract, carrying unspent funds over.
    async fn renew_contract(
        &self,
        addr: &str,
        old_id: ContractId,
        terms: &ContractTerms,
        timeout: Duration,
    ) -> Result<FormedContract, RpcError>;
}
