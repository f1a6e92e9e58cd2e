//! Core primitive types for the Ballast renter node.
//!
//! This crate provides fundamental types used across the Ballast stack:
//!
//! - [`HostPublicKey`] - host identity used for tree indexing and contracts
//! - [`Currency`] - non-negative arbitrary-precision coin amounts
//! - [`Weight`] - integer host score stored in the host tree
//! - [`NetworkParams`] - injected per-network tuning (standard/dev/testing)

mod currency;
mod key;
mod network;
mod weight;

pub use currency::Currency;
pub use key::HostPublicKey;
pub use network::{Network, NetworkParams, VersionPenalty};
pub use weight::Weight;

/// Block height on the underlying chain.
pub type BlockHeight = u64;
