//! Capability traits and shared types for the Ballast renter node.
//!
//! This crate defines the contract between the host-selection core and its
//! external collaborators: the consensus view, the wallet, the host RPC
//! client, and the gateway. Implementations live outside the core; tests use
//! the deterministic doubles each consumer crate defines for itself.

#![warn(missing_docs)]

pub use async_trait::async_trait;

mod allowance;
mod breakdown;
mod consensus;
mod error;
mod gateway;
mod host;
mod settings;
mod wallet;

pub use allowance::Allowance;
pub use breakdown::HostScoreBreakdown;
pub use consensus::ConsensusView;
pub use error::RpcError;
pub use gateway::Gateway;
pub use host::{ContractId, ContractTerms, FormedContract, HostRpcClient};
pub use settings::HostSettings;
pub use wallet::{FundingOutput, SignedTransaction, Wallet, WalletError};
