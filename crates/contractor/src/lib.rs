//! Contract portfolio maintenance.
//!
//! The contractor keeps the renter holding `allowance.hosts` good storage
//! contracts at all times: it drives on block-height updates, renews
//! contracts entering their renew window, replaces hosts that fell below
//! the acceptable score, forms new contracts from weighted host samples,
//! and keeps the per-contract utility flags (`good_for_upload`,
//! `good_for_renew`) current for the upload scheduler.

mod config;
mod contract;
mod contractor;
mod error;
mod set;

pub use config::ContractorConfig;
pub use contract::{Contract, ContractState, ContractUtility};
pub use contractor::{Contractor, CycleReport};
pub use error::ContractorError;
pub use set::{ContractSet, ContractsSummary};
