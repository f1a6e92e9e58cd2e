//! Contractor errors.

use ballast_hostdb::HostDbError;
use ballast_primitives::Currency;
use thiserror::Error;

/// Failures that escape the contractor.
///
/// Transient RPC failures never appear here; they become interaction
/// records and utility flag changes. What remains is the budget stop (the
/// formation batch aborts and the portfolio runs short) and database
/// failures, whose invariant-violation variant is fatal to the node.
#[derive(Debug, Error)]
pub enum ContractorError {
    /// Forming the next contract would overshoot the allowance.
    #[error("insufficient allowance funds: need {needed}, {available} uncommitted")]
    InsufficientFunds {
        /// Cost of the contract that did not fit.
        needed: Currency,
        /// Allowance funds not yet committed.
        available: Currency,
    },

    /// Host database failure.
    #[error(transparent)]
    HostDb(#[from] HostDbError),
}
