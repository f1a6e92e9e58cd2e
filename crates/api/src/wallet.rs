//! Wallet capability.

use alloy_primitives::B256;
use ballast_primitives::Currency;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::async_trait;

/// An unspent output reserved to fund a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingOutput {
    /// Output identifier.
    pub id: B256,
    /// Value of the output.
    pub value: Currency,
}

/// An opaque signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Raw signed payload.
    pub raw: Vec<u8>,
}

/// Wallet failures surfaced to the contractor.
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    /// The wallet cannot cover the requested amount.
    #[error("insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the contractor asked for.
        requested: Currency,
        /// Spendable balance.
        available: Currency,
    },

    /// The wallet is locked or unavailable.
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// Funding and signing, consumed during contract formation.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait Wallet: Send + Sync + 'static {
    /// Spendable balance.
    fn balance(&self) -> Currency;

    /// Reserve outputs covering `amount`.
    async fn fund_contract(&self, amount: Currency) -> Result<Vec<FundingOutput>, WalletError>;

    /// Sign a contract transaction.
    async fn sign(&self, payload: Vec<u8>) -> Result<SignedTransaction, WalletError>;
}
