//! Pipeline error taxonomy.

use alloy::primitives::Address;
use liquidator_chain::SubmissionError;
use thiserror::Error;

/// Aborts the rest of a cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("position repository query failed: {0:#}")]
    Repository(#[source] anyhow::Error),

    #[error("reserve snapshot fetch failed: {0:#}")]
    ReservesSnapshot(#[source] anyhow::Error),
}

/// Failure to execute one user's liquidation. The cycle continues.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no swap route from {collateral} to {debt}")]
    NoRouteFound { collateral: Address, debt: Address },

    #[error("swap route lookup failed: {0:#}")]
    Route(#[source] anyhow::Error),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}
