//! Per-network tuning parameters.
//!
//! The original daemon selected these with compile-time build tags; here a
//! [`NetworkParams`] value is injected at node construction so tests and dev
//! networks pick their own without recompiling.

use semver::Version;
use serde::{Deserialize, Serialize};

/// Which network profile the node runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production parameters.
    #[default]
    Standard,
    /// Local development: small storage thresholds.
    Dev,
    /// Unit testing: tiny storage thresholds.
    Testing,
}

/// One row of the version penalty table: hosts advertising a protocol
/// version below `below` have their weight multiplied by `factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionPenalty {
    pub below: Version,
    pub factor: f64,
}

/// Injected network parameters.
///
/// `required_storage` is the remaining-storage unit below whose multiples a
/// host's weight is penalized in cascade. The version table is a parameter
/// rather than a constant so that a network can roll a hardfork without a
/// renter release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: Network,
    /// Storage a host must offer to be considered worthwhile, in bytes.
    pub required_storage: u64,
    /// Hosts below this protocol version are scored effectively zero.
    pub hardfork_version: Version,
    /// Multiplicative penalties for outdated but post-hardfork versions,
    /// applied cumulatively in order.
    pub version_penalties: Vec<VersionPenalty>,
}

impl NetworkParams {
    /// Production parameters: 20 GB required storage.
    pub fn standard() -> Self {
        Self {
            network: Network::Standard,
            required_storage: 20_000_000_000,
            hardfork_version: Version::new(0, 3, 1),
            version_penalties: vec![
                VersionPenalty {
                    below: Version::new(0, 3, 2),
                    factor: 0.9,
                },
                VersionPenalty {
                    below: Version::new(0, 4, 0),
                    factor: 0.99999,
                },
            ],
        }
    }

    /// Development parameters: 1 MB required storage.
    pub fn dev() -> Self {
        Self {
            required_storage: 1_000_000,
            network: Network::Dev,
            ..Self::standard()
        }
    }

    /// Testing parameters: 1 KB required storage.
    pub fn testing() -> Self {
        Self {
            required_storage: 1_000,
            network: Network::Testing,
            ..Self::standard()
        }
    }

    /// Parameters for the given network profile.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Standard => Self::standard(),
            Network::Dev => Self::dev(),
            Network::Testing => Self::testing(),
        }
    }
}
