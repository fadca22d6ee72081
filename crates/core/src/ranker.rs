//! Liquidation opportunity ranking.
//!
//! For each collateral asset the ranker prices a liquidation against the
//! user's largest debt, applying the protocol close factor and the
//! collateral-availability cap, and returns the candidates by profit.

use crate::position::{Asset, LiquidationOpportunity, TokenAmount};
use crate::u256_math::{to_base_units, BPS_DENOMINATOR};

/// Below this health factor the full debt may be repaid; at or above it only half.
pub const CLOSE_FACTOR_HF_THRESHOLD: f64 = 0.95;

/// Rank liquidation opportunities for one user, most profitable first.
///
/// `debt_assets` must already be sorted by USD value, largest first; only
/// the first debt is considered. The caller is responsible for dropping
/// users whose health factor is outside `[0, 1)`. Ties keep input order.
pub fn rank_opportunities(
    collateral_assets: &[Asset],
    debt_assets: &[Asset],
    flat_cost_usd: f64,
    health_factor: f64,
) -> Vec<LiquidationOpportunity> {
    let Some(debt) = debt_assets.first() else {
        return Vec::new();
    };
    if debt.balance.is_zero() {
        return Vec::new();
    }

    let mut opportunities: Vec<LiquidationOpportunity> = collateral_assets
        .iter()
        .filter(|collateral| !collateral.balance.is_zero())
        .filter_map(|collateral| price_liquidation(collateral, debt, flat_cost_usd, health_factor))
        .collect();

    // sort_by is stable, so equal profits keep collateral order
    opportunities.sort_by(|a, b| b.profit_usd.total_cmp(&a.profit_usd));
    opportunities
}

/// Price a single collateral/debt pair.
fn price_liquidation(
    collateral: &Asset,
    debt: &Asset,
    flat_cost_usd: f64,
    health_factor: f64,
) -> Option<LiquidationOpportunity> {
    let bonus = collateral.liquidation_bonus as f64;
    if bonus <= 0.0 || debt.price <= 0.0 || collateral.price <= 0.0 {
        return None;
    }

    let max_seizable_usd = collateral.balance_usd;
    let max_debt_coverable_usd = max_seizable_usd * BPS_DENOMINATOR / bonus;

    let mut repay_usd = if health_factor < CLOSE_FACTOR_HF_THRESHOLD {
        debt.balance_usd
    } else {
        debt.balance_usd / 2.0
    };
    let mut seizable_usd = repay_usd * bonus / BPS_DENOMINATOR;

    // Not enough collateral to pay the full bonus: seize everything and
    // repay only what that covers.
    if seizable_usd > max_seizable_usd {
        seizable_usd = max_seizable_usd;
        repay_usd = max_debt_coverable_usd;
    }

    let profit_usd = seizable_usd - (repay_usd + flat_cost_usd);

    let repay_amount = to_base_units(repay_usd / debt.price, debt.decimals)?;
    if repay_amount.is_zero() {
        return None;
    }
    let seize_amount = to_base_units(seizable_usd / collateral.price, collateral.decimals)?;

    Some(LiquidationOpportunity {
        collateral: TokenAmount {
            address: collateral.address,
            symbol: collateral.symbol.clone(),
            decimals: collateral.decimals,
            amount: seize_amount,
        },
        debt: TokenAmount {
            address: debt.address,
            symbol: debt.symbol.clone(),
            decimals: debt.decimals,
            amount: repay_amount,
        },
        repay_usd,
        seizable_usd,
        profit_usd,
    })
}
