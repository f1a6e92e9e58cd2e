//! Gateway capability.

use std::net::IpAddr;

use crate::{RpcError, async_trait};

/// Name resolution provided by the gateway layer.
///
/// The sampler needs concrete IPs to enforce subnet diversity; resolution
/// is delegated so tests can pin addresses deterministically.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait Gateway: Send + Sync + 'static {
    /// Resolve a `host:port` net address to an IP.
    async fn resolve(&self, net_address: &str) -> Result<IpAddr, RpcError>;
}
