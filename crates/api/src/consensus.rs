//! Consensus view capability.

use ballast_primitives::BlockHeight;
use futures::stream::BoxStream;

/// Read-only view of the blockchain consumed by the core.
///
/// Height updates drive the contractor's maintenance cycle. Subscribers
/// must tolerate heights moving backwards after a reorganization; the
/// `is_reorg` flag distinguishes a reorg from ordinary progress.
#[auto_impl::auto_impl(&, Arc)]
pub trait ConsensusView: Send + Sync + 'static {
    /// The current block height.
    fn current_height(&self) -> BlockHeight;

    /// Stream of height updates, one item per applied block (or reorg).
    fn subscribe_height(&self) -> BoxStream<'static, BlockHeight>;

    /// Whether the most recent update rewound the chain.
    fn is_reorg(&self) -> bool;
}
