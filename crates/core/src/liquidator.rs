//! Liquidation execution for ranked opportunities.

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::ExecutionError;
use crate::position::LiquidationOpportunity;
use crate::u256_math::from_base_units;
use liquidator_api::{RouteProvider, SwapRoute};
use liquidator_chain::{ExecutionParams, LiquidationReceipt, LiquidationSubmitter};

/// Routes, submits and confirms one liquidation at a time.
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    /// Swap route source for collateral -> debt
    router: Arc<dyn RouteProvider>,

    /// Signs and broadcasts the helper call
    submitter: Arc<dyn LiquidationSubmitter>,

    /// Blocks to wait before a liquidation counts as done
    confirmations: u64,
}

impl ExecutionCoordinator {
    pub fn new(
        router: Arc<dyn RouteProvider>,
        submitter: Arc<dyn LiquidationSubmitter>,
        confirmations: u64,
    ) -> Self {
        Self {
            router,
            submitter,
            confirmations,
        }
    }

    /// Execute `opportunity` against `user` and wait for confirmation.
    #[instrument(skip(self, opportunity), fields(
        collateral = %opportunity.collateral.symbol,
        debt = %opportunity.debt.symbol,
    ))]
    pub async fn execute(
        &self,
        opportunity: &LiquidationOpportunity,
        user: Address,
    ) -> Result<LiquidationReceipt, ExecutionError> {
        let start = Instant::now();
        let collateral = opportunity.collateral.address;
        let debt = opportunity.debt.address;

        let route = self
            .router
            .find_route(collateral, debt, opportunity.collateral.amount)
            .await
            .map_err(ExecutionError::Route)?;

        if route.is_empty() {
            return Err(ExecutionError::NoRouteFound { collateral, debt });
        }

        debug!(
            router = self.router.router_id(),
            hops = route.hops.len(),
            expected_output = %route.expected_output,
            "Swap route found"
        );

        let params = build_params(opportunity, user, &route);
        let tx_hash = self.submitter.submit(&params).await?;

        let receipt = match self
            .submitter
            .await_confirmation(tx_hash, self.confirmations)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(tx_hash = %tx_hash, "Liquidation submitted but not confirmed");
                return Err(e.into());
            }
        };

        info!(
            tx_hash = %receipt.tx_hash,
            block = ?receipt.block_number,
            gas_used = receipt.gas_used,
            repay = from_base_units(opportunity.debt.amount, opportunity.debt.decimals),
            profit_usd = format!("{:.2}", opportunity.profit_usd),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Liquidation confirmed"
        );
        Ok(receipt)
    }
}

/// Map an opportunity and its route onto helper-call arguments.
///
/// `route` must be non-empty.
pub fn build_params(
    opportunity: &LiquidationOpportunity,
    user: Address,
    route: &SwapRoute,
) -> ExecutionParams {
    let fee_tier1 = route.hops.first().map(|h| h.fee_tier).unwrap_or_default();
    let (fee_tier2, intermediate_token, uses_multi_hop) = match route.hops.get(1) {
        Some(second) => (
            second.fee_tier,
            route.intermediate_token().unwrap_or(Address::ZERO),
            true,
        ),
        None => (0, Address::ZERO, false),
    };

    ExecutionParams {
        debt_token: opportunity.debt.address,
        repay_amount: opportunity.debt.amount,
        collateral_token: opportunity.collateral.address,
        borrower: user,
        fee_tier1,
        fee_tier2,
        intermediate_token,
        uses_multi_hop,
    }
}
