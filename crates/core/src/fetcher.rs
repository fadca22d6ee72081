//! Per-user position retrieval and normalization.

use crate::position::{Asset, UserPositionSnapshot};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use liquidator_chain::{ProtocolDataProvider, ReservesSnapshot, UserReserveSummary, UserSummary};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Reads one user's position and splits it into collateral and debt.
#[derive(Debug, Clone)]
pub struct PositionDataFetcher {
    protocol: Arc<dyn ProtocolDataProvider>,
}

impl PositionDataFetcher {
    pub fn new(protocol: Arc<dyn ProtocolDataProvider>) -> Self {
        Self { protocol }
    }

    /// Shared reserve snapshot, read once per cycle.
    pub async fn reserves_snapshot(&self) -> Result<ReservesSnapshot> {
        self.protocol.reserves_snapshot().await
    }

    /// Fetch and normalize `user` against `snapshot`.
    #[instrument(skip(self, snapshot))]
    pub async fn fetch(
        &self,
        user: Address,
        snapshot: &ReservesSnapshot,
    ) -> Result<UserPositionSnapshot> {
        let raw = self
            .protocol
            .user_raw_position(user, snapshot)
            .await
            .with_context(|| format!("reading position of {user}"))?;
        let summary = self.protocol.format_user_position(snapshot, &raw);
        let position = normalize(summary);

        debug!(
            health_factor = position.health_factor,
            collateral = position.collateral_assets.len(),
            debt = position.debt_assets.len(),
            "Position fetched"
        );
        Ok(position)
    }
}

/// Split a formatted position into collateral (enabled, positive supply)
/// and debt (positive borrow, largest USD value first).
pub fn normalize(summary: UserSummary) -> UserPositionSnapshot {
    let collateral_assets = summary
        .reserves
        .iter()
        .filter(|r| r.usage_as_collateral && !r.supplied.is_zero())
        .map(|r| to_asset(r, Side::Collateral))
        .collect();

    let mut debt_assets: Vec<Asset> = summary
        .reserves
        .iter()
        .filter(|r| !r.borrowed.is_zero())
        .map(|r| to_asset(r, Side::Debt))
        .collect();
    debt_assets.sort_by(|a, b| b.balance_usd.total_cmp(&a.balance_usd));

    UserPositionSnapshot {
        user: summary.user,
        health_factor: summary.health_factor,
        collateral_assets,
        debt_assets,
    }
}

#[derive(Clone, Copy)]
enum Side {
    Collateral,
    Debt,
}

fn to_asset(reserve: &UserReserveSummary, side: Side) -> Asset {
    let (balance, balance_usd) = match side {
        Side::Collateral => (reserve.supplied, reserve.supplied_usd),
        Side::Debt => (reserve.borrowed, reserve.borrowed_usd),
    };
    Asset {
        name: reserve.name.clone(),
        symbol: reserve.symbol.clone(),
        address: reserve.asset,
        decimals: reserve.decimals,
        balance,
        balance_usd,
        price: reserve.price_usd,
        liquidation_bonus: reserve.liquidation_bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{reserve_summary, FakeProtocol};
    use alloy::primitives::U256;

    #[test]
    fn test_normalize_splits_and_sorts() {
        let summary = UserSummary {
            user: Address::repeat_byte(0xee),
            health_factor: 0.9,
            total_collateral_usd: 0.0,
            total_debt_usd: 0.0,
            reserves: vec![
                // Collateral and small debt in the same reserve
                reserve_summary(1, 1000.0, 100.0, true),
                // Supplied but not enabled as collateral
                reserve_summary(2, 500.0, 0.0, false),
                // Large debt only
                reserve_summary(3, 0.0, 900.0, true),
            ],
        };

        let position = normalize(summary);

        assert_eq!(position.health_factor, 0.9);
        assert_eq!(position.collateral_assets.len(), 1);
        assert_eq!(position.collateral_assets[0].address, Address::repeat_byte(1));
        assert!((position.collateral_assets[0].balance_usd - 1000.0).abs() < 1e-9);

        let debts: Vec<Address> = position.debt_assets.iter().map(|a| a.address).collect();
        assert_eq!(debts, vec![Address::repeat_byte(3), Address::repeat_byte(1)]);
        assert!(position.debt_assets.iter().all(|a| a.balance > U256::ZERO));
    }

    #[tokio::test]
    async fn test_fetch_through_protocol() {
        let user = Address::repeat_byte(0x11);
        let protocol = FakeProtocol::default()
            .with_user(user, 0.8, vec![reserve_summary(1, 1000.0, 0.0, true), reserve_summary(2, 0.0, 2000.0, false)]);
        let fetcher = PositionDataFetcher::new(Arc::new(protocol));

        let snapshot = fetcher.reserves_snapshot().await.unwrap();
        let position = fetcher.fetch(user, &snapshot).await.unwrap();

        assert_eq!(position.user, user);
        assert_eq!(position.collateral_assets.len(), 1);
        assert_eq!(position.debt_assets.len(), 1);
        assert!(fetcher.fetch(Address::repeat_byte(0x99), &snapshot).await.is_err());
    }
}
