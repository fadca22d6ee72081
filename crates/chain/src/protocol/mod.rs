//! Protocol data layer.
//!
//! The liquidation pipeline treats the lending protocol as a black box with
//! three steps: read the shared reserve snapshot once per cycle, read one
//! user's raw balances, and format those balances into USD valuations plus
//! the protocol's own health factor.
//!
//! # Example
//!
//! ```rust,ignore
//! use liquidator_chain::protocol::{AaveV3DataProvider, ProtocolDataProvider};
//!
//! let protocol = AaveV3DataProvider::new(rpc, addresses_provider);
//! let snapshot = protocol.reserves_snapshot().await?;
//! let raw = protocol.user_raw_position(user, &snapshot).await?;
//! let summary = protocol.format_user_position(&snapshot, &raw);
//! ```

mod aave_v3;

pub use aave_v3::AaveV3DataProvider;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Static and price data for one reserve, shared by every user in a cycle.
#[derive(Debug, Clone)]
pub struct ReserveInfo {
    /// Underlying asset address
    pub asset: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Liquidation bonus in basis points (e.g., 10500 = 5% bonus)
    pub liquidation_bonus: u32,
    /// Whether the reserve may back borrows at all
    pub collateral_enabled: bool,
    /// Oracle price in base-currency units
    pub price: U256,
}

/// Point-in-time view of all reserves.
#[derive(Debug, Clone)]
pub struct ReservesSnapshot {
    pub reserves: Vec<ReserveInfo>,
    /// Oracle base unit (1e8 for USD-denominated Aave oracles)
    pub base_currency_unit: U256,
}

impl ReservesSnapshot {
    /// Look up a reserve by asset.
    pub fn reserve(&self, asset: &Address) -> Option<&ReserveInfo> {
        self.reserves.iter().find(|r| r.asset == *asset)
    }

    /// Reserve assets in protocol order.
    pub fn assets(&self) -> Vec<Address> {
        self.reserves.iter().map(|r| r.asset).collect()
    }
}

/// Raw balances of one user in one reserve.
#[derive(Debug, Clone, Default)]
pub struct RawUserReserve {
    pub asset: Address,
    pub a_token_balance: U256,
    pub stable_debt: U256,
    pub variable_debt: U256,
    /// User has this supply switched on as collateral
    pub usage_as_collateral: bool,
}

impl RawUserReserve {
    /// Total debt across rate modes.
    pub fn total_debt(&self) -> U256 {
        self.stable_debt.saturating_add(self.variable_debt)
    }
}

/// Raw on-chain position of one user.
#[derive(Debug, Clone)]
pub struct RawUserPosition {
    pub user: Address,
    pub reserves: Vec<RawUserReserve>,
    /// Health factor as reported by the pool (1e18 = 1.0)
    pub health_factor_wad: U256,
}

/// One reserve of a formatted user position.
#[derive(Debug, Clone)]
pub struct UserReserveSummary {
    pub asset: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Supplied amount in base units
    pub supplied: U256,
    pub supplied_usd: f64,
    /// Borrowed amount (stable + variable) in base units
    pub borrowed: U256,
    pub borrowed_usd: f64,
    /// USD per whole token
    pub price_usd: f64,
    pub liquidation_bonus: u32,
    /// Supply counts as collateral (reserve and user flag both on)
    pub usage_as_collateral: bool,
}

/// A user position with the protocol's valuations applied.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub user: Address,
    pub health_factor: f64,
    pub total_collateral_usd: f64,
    pub total_debt_usd: f64,
    pub reserves: Vec<UserReserveSummary>,
}

/// Capability for reading lending-protocol state.
#[async_trait]
pub trait ProtocolDataProvider: Send + Sync + Debug {
    /// Read reserve configuration and prices.
    async fn reserves_snapshot(&self) -> Result<ReservesSnapshot>;

    /// Read one user's balances in every reserve of `snapshot`.
    async fn user_raw_position(
        &self,
        user: Address,
        snapshot: &ReservesSnapshot,
    ) -> Result<RawUserPosition>;

    /// Apply the protocol's USD valuation and health-factor math.
    fn format_user_position(
        &self,
        snapshot: &ReservesSnapshot,
        raw: &RawUserPosition,
    ) -> UserSummary;
}
