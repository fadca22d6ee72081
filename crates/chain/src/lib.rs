//! Liquidator chain interaction layer.
//!
//! This crate provides:
//! - Priority-ordered RPC failover with pluggable backoff
//! - Contract bindings for the Superlend (Aave V3) deployment and the
//!   FlashLiquidations helper
//! - The protocol data provider (reserves, user balances, valuation)
//! - Liquidation transaction signing, broadcast and confirmation

pub mod contracts;
pub mod failover;
pub mod protocol;
mod provider;
mod submitter;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_node;

pub use contracts::{LIQUIDATION_HELPER, POOL_ADDRESSES_PROVIDER};
pub use failover::{
    AllEndpointsFailed, Backoff, Endpoint, EndpointFailure, ExponentialBackoff, FailoverClient,
    NoBackoff,
};
pub use protocol::{
    AaveV3DataProvider, ProtocolDataProvider, RawUserPosition, RawUserReserve, ReserveInfo,
    ReservesSnapshot, UserReserveSummary, UserSummary,
};
pub use provider::{RpcEndpoint, RpcFailover};
pub use submitter::{
    ExecutionParams, FlashLiquidationSubmitter, LiquidationReceipt, LiquidationSubmitter,
    SubmissionError,
};
