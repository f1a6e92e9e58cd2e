//! Host identity.

use core::fmt;
use core::str::FromStr;

use alloy_primitives::{B256, hex};
use serde::{Deserialize, Serialize};

/// Public key identifying a host.
///
/// A 32-byte key under which a host announces itself on chain. Used for host
/// tree indexing, contract attribution, and journal keys. The key is opaque
/// to the renter; signature verification happens in the contract runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HostPublicKey(B256);

impl HostPublicKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: B256) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    pub const fn as_b256(&self) -> B256 {
        self.0
    }

    /// A key with every byte set to `n`, for tests and examples.
    pub fn repeat_byte(n: u8) -> Self {
        Self(B256::repeat_byte(n))
    }
}

impl From<B256> for HostPublicKey {
    fn from(bytes: B256) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for HostPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Abbreviated form for logs; full key available via Debug.
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}

impl FromStr for HostPublicKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s).map(Self)
    }
}
