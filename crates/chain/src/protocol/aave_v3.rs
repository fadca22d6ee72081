//! Aave V3 protocol data provider.
//!
//! Works against any Aave V3 deployment (Superlend on Etherlink included):
//! the Pool, AaveOracle and PoolDataProvider are resolved through the
//! PoolAddressesProvider, and every read goes through the RPC failover set.
//!
//! Reserve metadata (token name, symbol, decimals, liquidation bonus and
//! collateral flag) is cached between cycles, so a steady-state snapshot
//! costs one reserves-list read plus one oracle read. A user costs one
//! account read plus one sequential read per reserve, which keeps the
//! requests in flight per batch at the batch size.

use super::{
    ProtocolDataProvider, RawUserPosition, RawUserReserve, ReserveInfo, ReservesSnapshot,
    UserReserveSummary, UserSummary,
};
use crate::contracts::{
    IAaveOracle, IERC20Metadata, IPool, IPoolAddressesProvider, IPoolDataProvider,
};
use crate::provider::RpcFailover;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Concurrent metadata reads while filling the cache.
const METADATA_READ_CONCURRENCY: usize = 4;

/// Reserve configuration can change through governance.
const METADATA_TTL: Duration = Duration::from_secs(3600);

/// Health factor scale used by the pool.
const HEALTH_FACTOR_SCALE: f64 = 1e18;

/// Addresses resolved from the PoolAddressesProvider.
#[derive(Debug, Clone, Copy)]
struct ProtocolContracts {
    pool: Address,
    oracle: Address,
    data_provider: Address,
}

/// Per-reserve data that does not move with prices.
#[derive(Debug, Clone)]
struct ReserveMetadata {
    name: String,
    symbol: String,
    decimals: u8,
    liquidation_bonus: u32,
    collateral_enabled: bool,
    loaded_at: Instant,
}

/// Aave V3 data provider.
#[derive(Debug, Clone)]
pub struct AaveV3DataProvider {
    rpc: RpcFailover,
    addresses_provider: Address,
    /// Resolved on first use
    contracts: OnceCell<ProtocolContracts>,
    /// Keyed by underlying asset
    metadata: Arc<DashMap<Address, ReserveMetadata>>,
}

impl AaveV3DataProvider {
    /// Create a provider for the deployment registered at `addresses_provider`.
    pub fn new(rpc: RpcFailover, addresses_provider: Address) -> Self {
        Self {
            rpc,
            addresses_provider,
            contracts: OnceCell::new(),
            metadata: Arc::new(DashMap::new()),
        }
    }

    async fn contracts(&self) -> Result<ProtocolContracts> {
        self.contracts
            .get_or_try_init(|| self.resolve_contracts())
            .await
            .copied()
    }

    async fn resolve_contracts(&self) -> Result<ProtocolContracts> {
        let registry = self.addresses_provider;
        let (pool, oracle, data_provider) = self
            .rpc
            .call("resolveProtocolContracts", |ep| async move {
                let provider = IPoolAddressesProvider::new(registry, ep.provider());
                let pool = provider.getPool().call().await?._0;
                let oracle = provider.getPriceOracle().call().await?._0;
                let data_provider = provider.getPoolDataProvider().call().await?._0;
                Ok((pool, oracle, data_provider))
            })
            .await?;

        debug!(%pool, %oracle, %data_provider, "Resolved protocol contracts");
        Ok(ProtocolContracts {
            pool,
            oracle,
            data_provider,
        })
    }

    async fn load_metadata(&self, data_provider: Address, asset: Address) -> Result<ReserveMetadata> {
        let config = self
            .rpc
            .call("getReserveConfigurationData", |ep| async move {
                let contract = IPoolDataProvider::new(data_provider, ep.provider());
                Ok(contract.getReserveConfigurationData(asset).call().await?)
            })
            .await?;

        let (name, symbol) = self
            .rpc
            .call("erc20Metadata", |ep| async move {
                let token = IERC20Metadata::new(asset, ep.provider());
                let name = token.name().call().await?._0;
                let symbol = token.symbol().call().await?._0;
                Ok((name, symbol))
            })
            .await?;

        Ok(ReserveMetadata {
            name,
            symbol,
            decimals: config.decimals.saturating_to::<u8>(),
            liquidation_bonus: config.liquidationBonus.saturating_to::<u32>(),
            collateral_enabled: config.usageAsCollateralEnabled,
            loaded_at: Instant::now(),
        })
    }

    /// Load metadata for reserves that are new or past their TTL.
    async fn refresh_metadata(&self, data_provider: Address, assets: &[Address]) -> Result<()> {
        let stale: Vec<Address> = assets
            .iter()
            .copied()
            .filter(|asset| {
                self.metadata
                    .get(asset)
                    .map_or(true, |m| m.loaded_at.elapsed() >= METADATA_TTL)
            })
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        let loaded: Vec<(Address, ReserveMetadata)> = stream::iter(stale)
            .map(|asset| async move {
                let metadata = self
                    .load_metadata(data_provider, asset)
                    .await
                    .with_context(|| format!("reading reserve {asset}"))?;
                Ok::<_, anyhow::Error>((asset, metadata))
            })
            .buffered(METADATA_READ_CONCURRENCY)
            .try_collect()
            .await?;

        debug!(reserves = loaded.len(), "Reserve metadata loaded");
        for (asset, metadata) in loaded {
            self.metadata.insert(asset, metadata);
        }
        Ok(())
    }

    async fn user_reserve(
        &self,
        data_provider: Address,
        asset: Address,
        user: Address,
    ) -> Result<RawUserReserve> {
        let data = self
            .rpc
            .call("getUserReserveData", |ep| async move {
                let contract = IPoolDataProvider::new(data_provider, ep.provider());
                Ok(contract.getUserReserveData(asset, user).call().await?)
            })
            .await?;

        Ok(RawUserReserve {
            asset,
            a_token_balance: data.currentATokenBalance,
            stable_debt: data.currentStableDebt,
            variable_debt: data.currentVariableDebt,
            usage_as_collateral: data.usageAsCollateralEnabled,
        })
    }
}

#[async_trait]
impl ProtocolDataProvider for AaveV3DataProvider {
    #[instrument(skip(self))]
    async fn reserves_snapshot(&self) -> Result<ReservesSnapshot> {
        let contracts = self.contracts().await?;
        let pool = contracts.pool;
        let oracle = contracts.oracle;

        let assets = self
            .rpc
            .call("getReservesList", |ep| async move {
                Ok(IPool::new(pool, ep.provider()).getReservesList().call().await?._0)
            })
            .await?;

        let (base_currency_unit, prices) = {
            let assets = assets.clone();
            self.rpc
                .call("getAssetsPrices", move |ep| {
                    let assets = assets.clone();
                    async move {
                        let contract = IAaveOracle::new(oracle, ep.provider());
                        let unit = contract.BASE_CURRENCY_UNIT().call().await?._0;
                        let prices = contract.getAssetsPrices(assets).call().await?._0;
                        Ok((unit, prices))
                    }
                })
                .await?
        };

        anyhow::ensure!(
            prices.len() == assets.len(),
            "oracle returned {} prices for {} reserves",
            prices.len(),
            assets.len()
        );

        self.refresh_metadata(contracts.data_provider, &assets).await?;

        let reserves = assets
            .into_iter()
            .zip(prices)
            .map(|(asset, price)| {
                let metadata = self
                    .metadata
                    .get(&asset)
                    .with_context(|| format!("no metadata for reserve {asset}"))?;
                Ok(ReserveInfo {
                    asset,
                    name: metadata.name.clone(),
                    symbol: metadata.symbol.clone(),
                    decimals: metadata.decimals,
                    liquidation_bonus: metadata.liquidation_bonus,
                    collateral_enabled: metadata.collateral_enabled,
                    price,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            reserves = reserves.len(),
            base_currency_unit = %base_currency_unit,
            "Reserves snapshot loaded"
        );

        Ok(ReservesSnapshot {
            reserves,
            base_currency_unit,
        })
    }

    #[instrument(skip(self, snapshot))]
    async fn user_raw_position(
        &self,
        user: Address,
        snapshot: &ReservesSnapshot,
    ) -> Result<RawUserPosition> {
        let contracts = self.contracts().await?;
        let pool = contracts.pool;
        let data_provider = contracts.data_provider;

        let account = self
            .rpc
            .call("getUserAccountData", |ep| async move {
                Ok(IPool::new(pool, ep.provider()).getUserAccountData(user).call().await?)
            })
            .await?;

        // Nothing supplied or borrowed anywhere
        let mut reserves = Vec::new();
        if !account.totalCollateralBase.is_zero() || !account.totalDebtBase.is_zero() {
            reserves.reserve(snapshot.reserves.len());
            for asset in snapshot.assets() {
                reserves.push(self.user_reserve(data_provider, asset, user).await?);
            }
        }

        Ok(RawUserPosition {
            user,
            reserves,
            health_factor_wad: account.healthFactor,
        })
    }

    fn format_user_position(
        &self,
        snapshot: &ReservesSnapshot,
        raw: &RawUserPosition,
    ) -> UserSummary {
        format_position(snapshot, raw)
    }
}

/// Value every reserve the user touches and attach the pool's health factor.
pub(crate) fn format_position(snapshot: &ReservesSnapshot, raw: &RawUserPosition) -> UserSummary {
    let base_unit = u256_to_f64(snapshot.base_currency_unit);

    let reserves: Vec<UserReserveSummary> = raw
        .reserves
        .iter()
        .filter_map(|user_reserve| {
            let reserve = snapshot.reserve(&user_reserve.asset)?;
            let borrowed = user_reserve.total_debt();
            if user_reserve.a_token_balance.is_zero() && borrowed.is_zero() {
                return None;
            }

            let price_usd = if base_unit > 0.0 {
                u256_to_f64(reserve.price) / base_unit
            } else {
                0.0
            };

            Some(UserReserveSummary {
                asset: reserve.asset,
                name: reserve.name.clone(),
                symbol: reserve.symbol.clone(),
                decimals: reserve.decimals,
                supplied: user_reserve.a_token_balance,
                supplied_usd: usd_value(user_reserve.a_token_balance, reserve.decimals, price_usd),
                borrowed,
                borrowed_usd: usd_value(borrowed, reserve.decimals, price_usd),
                price_usd,
                liquidation_bonus: reserve.liquidation_bonus,
                usage_as_collateral: reserve.collateral_enabled && user_reserve.usage_as_collateral,
            })
        })
        .collect();

    let total_collateral_usd = reserves
        .iter()
        .filter(|r| r.usage_as_collateral)
        .map(|r| r.supplied_usd)
        .sum();
    let total_debt_usd = reserves.iter().map(|r| r.borrowed_usd).sum();

    UserSummary {
        user: raw.user,
        health_factor: u256_to_f64(raw.health_factor_wad) / HEALTH_FACTOR_SCALE,
        total_collateral_usd,
        total_debt_usd,
        reserves,
    }
}

/// USD value of `amount` base units.
fn usd_value(amount: U256, decimals: u8, price_usd: f64) -> f64 {
    if amount.is_zero() || price_usd == 0.0 {
        return 0.0;
    }
    u256_to_f64(amount) / 10_f64.powi(decimals as i32) * price_usd
}

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::FailoverClient;
    use crate::provider::RpcEndpoint;
    use crate::test_node::TestNode;
    use alloy::primitives::Uint;
    use alloy::sol_types::SolCall;

    const REGISTRY: Address = Address::new([0x01; 20]);
    const POOL: Address = Address::new([0x02; 20]);
    const ORACLE: Address = Address::new([0x03; 20]);
    const DATA_PROVIDER: Address = Address::new([0x04; 20]);
    const WETH: Address = Address::new([0xa1; 20]);
    const USDC: Address = Address::new([0xb2; 20]);
    /// 1 WETH supplied, 900 USDC borrowed
    const BORROWER: Address = Address::new([0xee; 20]);

    fn wad(value: u64) -> U256 {
        U256::from(value) * U256::from(10u64).pow(U256::from(18))
    }

    /// Answers as a two-reserve Aave V3 deployment.
    fn two_reserve_pool(calldata: &[u8]) -> Vec<u8> {
        let Some(selector) = calldata.get(..4) else {
            return Vec::new();
        };

        if selector == IPoolAddressesProvider::getPoolCall::SELECTOR {
            IPoolAddressesProvider::getPoolCall::abi_encode_returns(&(POOL,))
        } else if selector == IPoolAddressesProvider::getPriceOracleCall::SELECTOR {
            IPoolAddressesProvider::getPriceOracleCall::abi_encode_returns(&(ORACLE,))
        } else if selector == IPoolAddressesProvider::getPoolDataProviderCall::SELECTOR {
            IPoolAddressesProvider::getPoolDataProviderCall::abi_encode_returns(&(DATA_PROVIDER,))
        } else if selector == IPool::getReservesListCall::SELECTOR {
            IPool::getReservesListCall::abi_encode_returns(&(vec![WETH, USDC],))
        } else if selector == IAaveOracle::BASE_CURRENCY_UNITCall::SELECTOR {
            IAaveOracle::BASE_CURRENCY_UNITCall::abi_encode_returns(&(U256::from(100_000_000u64),))
        } else if selector == IAaveOracle::getAssetsPricesCall::SELECTOR {
            let prices = vec![U256::from(2_000_00000000u64), U256::from(1_00000000u64)];
            IAaveOracle::getAssetsPricesCall::abi_encode_returns(&(prices,))
        } else if let Ok(call) =
            IPoolDataProvider::getReserveConfigurationDataCall::abi_decode(calldata, true)
        {
            let (decimals, bonus) = if call.asset == WETH { (18u64, 10500u64) } else { (6, 10450) };
            IPoolDataProvider::getReserveConfigurationDataCall::abi_encode_returns(&(
                U256::from(decimals),
                U256::from(8000u64),
                U256::from(8500u64),
                U256::from(bonus),
                U256::from(1000u64),
                true,
                true,
                false,
                true,
                false,
            ))
        } else if selector == IERC20Metadata::nameCall::SELECTOR {
            IERC20Metadata::nameCall::abi_encode_returns(&("Token".to_string(),))
        } else if selector == IERC20Metadata::symbolCall::SELECTOR {
            IERC20Metadata::symbolCall::abi_encode_returns(&("TKN".to_string(),))
        } else if let Ok(call) = IPool::getUserAccountDataCall::abi_decode(calldata, true) {
            let account = if call.user == BORROWER {
                (
                    U256::from(2_000_00000000u64),
                    U256::from(900_00000000u64),
                    U256::ZERO,
                    U256::from(8500u64),
                    U256::from(8000u64),
                    wad(9) / U256::from(10u64),
                )
            } else {
                (U256::ZERO, U256::ZERO, U256::ZERO, U256::ZERO, U256::ZERO, U256::MAX)
            };
            IPool::getUserAccountDataCall::abi_encode_returns(&account)
        } else if let Ok(call) = IPoolDataProvider::getUserReserveDataCall::abi_decode(calldata, true)
        {
            let (supplied, variable_debt) = match (call.user == BORROWER, call.asset == WETH) {
                (true, true) => (wad(1), U256::ZERO),
                (true, false) => (U256::ZERO, U256::from(900_000_000u64)),
                _ => (U256::ZERO, U256::ZERO),
            };
            IPoolDataProvider::getUserReserveDataCall::abi_encode_returns(&(
                supplied,
                U256::ZERO,
                variable_debt,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                Uint::<40, 1>::ZERO,
                true,
            ))
        } else {
            Vec::new()
        }
    }

    fn provider_over(node: &TestNode) -> AaveV3DataProvider {
        let endpoints = RpcEndpoint::from_urls(&[node.url().to_string()]).unwrap();
        AaveV3DataProvider::new(FailoverClient::new(endpoints), REGISTRY)
    }

    fn reserve(asset: u8, decimals: u8, price: u64, bonus: u32, collateral: bool) -> ReserveInfo {
        ReserveInfo {
            asset: Address::repeat_byte(asset),
            name: format!("Token {asset}"),
            symbol: format!("T{asset}"),
            decimals,
            liquidation_bonus: bonus,
            collateral_enabled: collateral,
            price: U256::from(price),
        }
    }

    fn snapshot() -> ReservesSnapshot {
        ReservesSnapshot {
            reserves: vec![
                // 18-decimal asset at $2000
                reserve(1, 18, 2_000_00000000, 10500, true),
                // 6-decimal stablecoin at $1
                reserve(2, 6, 1_00000000, 10450, true),
                // Borrow-only asset
                reserve(3, 8, 50_000_00000000, 0, false),
            ],
            base_currency_unit: U256::from(100_000_000u64),
        }
    }

    #[test]
    fn test_format_values_reserves() {
        let raw = RawUserPosition {
            user: Address::repeat_byte(0xee),
            reserves: vec![
                RawUserReserve {
                    asset: Address::repeat_byte(1),
                    a_token_balance: U256::from(10u64).pow(U256::from(18)),
                    usage_as_collateral: true,
                    ..Default::default()
                },
                RawUserReserve {
                    asset: Address::repeat_byte(2),
                    stable_debt: U256::from(500_000_000u64),
                    variable_debt: U256::from(1_000_000_000u64),
                    ..Default::default()
                },
                RawUserReserve {
                    asset: Address::repeat_byte(3),
                    ..Default::default()
                },
            ],
            // 0.85
            health_factor_wad: U256::from(850_000_000_000_000_000u64),
        };

        let summary = format_position(&snapshot(), &raw);

        assert!((summary.health_factor - 0.85).abs() < 1e-12);
        // Untouched reserve is dropped
        assert_eq!(summary.reserves.len(), 2);

        let weth = &summary.reserves[0];
        assert!((weth.supplied_usd - 2000.0).abs() < 1e-9);
        assert!((weth.price_usd - 2000.0).abs() < 1e-9);
        assert_eq!(weth.liquidation_bonus, 10500);
        assert!(weth.usage_as_collateral);

        let usdc = &summary.reserves[1];
        assert_eq!(usdc.borrowed, U256::from(1_500_000_000u64));
        assert!((usdc.borrowed_usd - 1500.0).abs() < 1e-9);

        assert!((summary.total_collateral_usd - 2000.0).abs() < 1e-9);
        assert!((summary.total_debt_usd - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_collateral_requires_reserve_and_user_flags() {
        let raw = RawUserPosition {
            user: Address::ZERO,
            reserves: vec![
                // User flag off
                RawUserReserve {
                    asset: Address::repeat_byte(1),
                    a_token_balance: U256::from(1u64),
                    usage_as_collateral: false,
                    ..Default::default()
                },
                // Reserve not collateral-enabled
                RawUserReserve {
                    asset: Address::repeat_byte(3),
                    a_token_balance: U256::from(1u64),
                    usage_as_collateral: true,
                    ..Default::default()
                },
            ],
            health_factor_wad: U256::MAX,
        };

        let summary = format_position(&snapshot(), &raw);
        assert!(summary.reserves.iter().all(|r| !r.usage_as_collateral));
        assert_eq!(summary.total_collateral_usd, 0.0);
        // No debt: the pool reports uint256 max
        assert!(summary.health_factor > 1.0);
    }

    #[test]
    fn test_usd_value() {
        // 1000 USDC (6 decimals) at $1.00
        assert!((usd_value(U256::from(1_000_000_000u64), 6, 1.0) - 1000.0).abs() < 0.01);
        assert_eq!(usd_value(U256::ZERO, 6, 1.0), 0.0);
        assert_eq!(usd_value(U256::from(5u64), 6, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_metadata_cached_between_snapshots() {
        let node = TestNode::spawn(two_reserve_pool).await.unwrap();
        let provider = provider_over(&node);

        provider.reserves_snapshot().await.unwrap();
        let snapshot = provider.reserves_snapshot().await.unwrap();

        // Prices every cycle, metadata once
        assert_eq!(node.calls_to(IAaveOracle::getAssetsPricesCall::SELECTOR), 2);
        assert_eq!(
            node.calls_to(IPoolDataProvider::getReserveConfigurationDataCall::SELECTOR),
            2
        );
        assert_eq!(node.calls_to(IERC20Metadata::nameCall::SELECTOR), 2);
        assert_eq!(node.calls_to(IERC20Metadata::symbolCall::SELECTOR), 2);
        assert_eq!(node.calls_to(IPoolAddressesProvider::getPoolCall::SELECTOR), 1);

        assert_eq!(snapshot.assets(), vec![WETH, USDC]);
        let usdc = snapshot.reserve(&USDC).unwrap();
        assert_eq!(usdc.decimals, 6);
        assert_eq!(usdc.liquidation_bonus, 10450);
        assert_eq!(usdc.price, U256::from(1_00000000u64));
        assert_eq!(usdc.symbol, "TKN");
    }

    #[tokio::test]
    async fn test_user_reserves_read_one_at_a_time() {
        let node = TestNode::spawn_with_latency(two_reserve_pool, Duration::from_millis(10))
            .await
            .unwrap();
        let provider = provider_over(&node);
        let snapshot = provider.reserves_snapshot().await.unwrap();
        node.reset_max_in_flight();

        let raw = provider.user_raw_position(BORROWER, &snapshot).await.unwrap();

        assert_eq!(node.max_in_flight(), 1);
        assert_eq!(
            node.calls_to(IPoolDataProvider::getUserReserveDataCall::SELECTOR),
            2
        );
        assert_eq!(raw.reserves.len(), 2);

        let summary = provider.format_user_position(&snapshot, &raw);
        assert!((summary.health_factor - 0.9).abs() < 1e-12);
        assert!((summary.total_collateral_usd - 2000.0).abs() < 1e-9);
        assert!((summary.total_debt_usd - 900.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_account_skips_reserve_reads() {
        let node = TestNode::spawn(two_reserve_pool).await.unwrap();
        let provider = provider_over(&node);
        let snapshot = provider.reserves_snapshot().await.unwrap();

        let raw = provider
            .user_raw_position(Address::repeat_byte(0x77), &snapshot)
            .await
            .unwrap();

        assert!(raw.reserves.is_empty());
        assert_eq!(
            node.calls_to(IPoolDataProvider::getUserReserveDataCall::SELECTOR),
            0
        );
        assert_eq!(raw.health_factor_wad, U256::MAX);
    }
}
