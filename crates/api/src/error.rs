//! RPC error kinds shared by the capability traits.

use thiserror::Error;

/// Failure of an outbound host RPC.
///
/// Unreachable and timed-out probes are expected operating conditions for
/// the scanner and contractor; they become scan records and interaction
/// history, never propagated errors.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// TCP connect refused or no route to host.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The operation exceeded its deadline.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// The host answered but rejected the request.
    #[error("host rejected request: {0}")]
    Rejected(String),

    /// The host violated the wire protocol mid-exchange.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The net address could not be resolved.
    #[error("address resolution failed: {0}")]
    Resolution(String),
}

impl RpcError {
    /// Returns true if retrying against the same host later could succeed.
    ///
    /// A rejection is a policy decision by the host; unreachability and
    /// timeouts are transient network conditions.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout(_) | Self::Resolution(_)
        )
    }
}
