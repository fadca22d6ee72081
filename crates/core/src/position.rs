//! Position and opportunity data structures.

use alloy::primitives::{Address, U256};
use serde::Serialize;

/// A user flagged by the position store, worst health factor first.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePosition {
    pub user: Address,
    pub health_factor: f64,
}

/// One side (collateral or debt) of a user's position in one reserve.
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub name: String,
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// Balance in base units (never zero once normalized)
    pub balance: U256,
    pub balance_usd: f64,
    /// USD per whole token
    pub price: f64,
    /// Liquidation bonus in basis points (10500 = 1.05x)
    pub liquidation_bonus: u32,
}

/// Normalized view of one user, built fresh every cycle.
#[derive(Debug, Clone)]
pub struct UserPositionSnapshot {
    pub user: Address,
    pub health_factor: f64,
    /// Enabled collateral with a positive balance
    pub collateral_assets: Vec<Asset>,
    /// Positive debts, largest USD value first
    pub debt_assets: Vec<Asset>,
}

impl UserPositionSnapshot {
    /// Protocol allows liquidation at this health factor.
    pub fn is_liquidatable(&self) -> bool {
        (0.0..1.0).contains(&self.health_factor)
    }
}

/// Token and base-unit amount on one side of a liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenAmount {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub amount: U256,
}

/// A priced liquidation candidate, valid only for the snapshot it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidationOpportunity {
    /// Collateral to seize
    pub collateral: TokenAmount,
    /// Debt to repay
    pub debt: TokenAmount,
    pub repay_usd: f64,
    pub seizable_usd: f64,
    pub profit_usd: f64,
}
