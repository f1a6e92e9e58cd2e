//! Host database errors.

use ballast_primitives::HostPublicKey;
use thiserror::Error;

/// Failures of the host database and its persistence.
///
/// Scan and RPC failures are not represented here at all; they are recorded
/// as host history. These errors are either caller mistakes (`UnknownHost`),
/// startup blockers (`Corrupt`, `Io`), or programming errors
/// (`InvariantViolation`) that must abort the node rather than be swallowed.
#[derive(Debug, Error)]
pub enum HostDbError {
    /// The requested host is not in the tree.
    #[error("unknown host {0}")]
    UnknownHost(HostPublicKey),

    /// A journal or snapshot record failed to deserialize. The database
    /// refuses to start rather than drop records.
    #[error("host journal corrupt: {0}")]
    Corrupt(String),

    /// Filesystem failure while reading or writing persistence.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A record could not be serialized for the journal.
    #[error("journal serialization failed: {0}")]
    Serialization(String),

    /// Tree weight bookkeeping went inconsistent. Fatal.
    #[error("host tree invariant violated: {0}")]
    InvariantViolation(String),
}

impl HostDbError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
