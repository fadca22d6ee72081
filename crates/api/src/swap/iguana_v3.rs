//! IguanaDEX V3 swap router implementation.
//!
//! IguanaDEX V3 is a concentrated-liquidity DEX on Etherlink with the
//! Uniswap V3 factory/quoter interface. Candidate pools are discovered via
//! the factory and every candidate path (direct, or two hops through a base
//! token) is priced with QuoterV2; the best quote wins. Every read goes
//! through the RPC failover set.

use super::{PoolHop, RouteProvider, SwapRoute};
use crate::tokens::{is_stablecoin, BASE_TOKENS};
use alloy::primitives::{Address, Uint, U160, U256};
use alloy::sol;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use liquidator_chain::RpcFailover;
use smallvec::smallvec;
use std::sync::Arc;
use tracing::{debug, instrument};

sol! {
    #[sol(rpc)]
    interface IV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    #[sol(rpc)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
            external
            returns (
                uint256 amountOut,
                uint160 sqrtPriceX96After,
                uint32 initializedTicksCrossed,
                uint256 gasEstimate
            );

        function quoteExactInput(bytes memory path, uint256 amountIn)
            external
            returns (
                uint256 amountOut,
                uint160[] memory sqrtPriceX96AfterList,
                uint32[] memory initializedTicksCrossedList,
                uint256 gasEstimate
            );
    }
}

/// IguanaDEX V3 contract addresses.
#[derive(Debug, Clone, Copy)]
pub struct IguanaV3Addresses {
    pub factory: Address,
    pub quoter_v2: Address,
}

/// IguanaDEX V3 fee tiers in hundredths of a basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeTier {
    /// 0.01% - Ultra stable pairs (e.g., USDC/USDT)
    Lowest = 100,
    /// 0.05% - Stable pairs
    Low = 500,
    /// 0.25% - Standard pairs
    Medium = 2500,
    /// 1% - Exotic pairs
    High = 10000,
}

impl FeeTier {
    /// All fee tiers, lowest first.
    pub const ALL: [FeeTier; 4] = [Self::Lowest, Self::Low, Self::Medium, Self::High];

    /// Fee tiers worth looking up for a pair.
    pub fn tiers_for_pair(is_stable_pair: bool) -> Vec<u32> {
        if is_stable_pair {
            vec![Self::Lowest as u32, Self::Low as u32]
        } else {
            Self::ALL.iter().map(|t| *t as u32).collect()
        }
    }
}

/// IguanaDEX V3 swap router.
#[derive(Clone)]
pub struct IguanaV3Router {
    /// Node set for factory lookups and quotes
    rpc: RpcFailover,
    /// Contract addresses
    addresses: IguanaV3Addresses,
    /// Intermediate tokens for two-hop routes
    base_tokens: Vec<Address>,
    /// Pool lookups: (token_a, token_b, fee) -> pool (None = no pool deployed)
    pool_cache: Arc<DashMap<(Address, Address, u32), Option<Address>>>,
}

impl std::fmt::Debug for IguanaV3Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IguanaV3Router")
            .field("rpc", &self.rpc)
            .field("addresses", &self.addresses)
            .field("cached_pools", &self.pool_cache.len())
            .finish()
    }
}

impl IguanaV3Router {
    /// Create a new router.
    pub fn new(rpc: RpcFailover, addresses: IguanaV3Addresses) -> Self {
        Self {
            rpc,
            addresses,
            base_tokens: BASE_TOKENS.to_vec(),
            pool_cache: Arc::new(DashMap::new()),
        }
    }

    /// Pool address for a pair and fee tier, if one is deployed.
    async fn pool_for(&self, token_a: Address, token_b: Address, fee: u32) -> Result<Option<Address>> {
        // Factory lookups are order-insensitive, so key on the sorted pair.
        let key = if token_a < token_b {
            (token_a, token_b, fee)
        } else {
            (token_b, token_a, fee)
        };
        if let Some(cached) = self.pool_cache.get(&key) {
            return Ok(*cached);
        }

        let factory = self.addresses.factory;
        let pool = self
            .rpc
            .call("getPool", |ep| async move {
                let factory = IV3Factory::new(factory, ep.provider());
                Ok(factory
                    .getPool(token_a, token_b, Uint::<24, 1>::from(fee))
                    .call()
                    .await?
                    .pool)
            })
            .await?;

        let pool = (!pool.is_zero()).then_some(pool);
        self.pool_cache.insert(key, pool);
        Ok(pool)
    }

    /// All deployed pools for a pair.
    async fn pools_for_pair(&self, token_a: Address, token_b: Address) -> Result<Vec<PoolHop>> {
        let stable = is_stablecoin(&token_a) && is_stablecoin(&token_b);
        let mut pools = Vec::new();
        for fee in FeeTier::tiers_for_pair(stable) {
            if let Some(pool) = self.pool_for(token_a, token_b, fee).await? {
                pools.push(PoolHop { pool, fee_tier: fee });
            }
        }
        Ok(pools)
    }

    /// Enumerate direct and two-hop candidates, not yet quoted.
    async fn candidates(&self, token_in: Address, token_out: Address) -> Result<Vec<SwapRoute>> {
        let mut candidates: Vec<SwapRoute> = self
            .pools_for_pair(token_in, token_out)
            .await?
            .into_iter()
            .map(|hop| SwapRoute {
                hops: smallvec![hop],
                path_tokens: vec![token_in, token_out],
                expected_output: U256::ZERO,
            })
            .collect();

        for base in &self.base_tokens {
            if *base == token_in || *base == token_out {
                continue;
            }
            let first_legs = self.pools_for_pair(token_in, *base).await?;
            if first_legs.is_empty() {
                continue;
            }
            let second_legs = self.pools_for_pair(*base, token_out).await?;
            for first in &first_legs {
                for second in &second_legs {
                    candidates.push(SwapRoute {
                        hops: smallvec![*first, *second],
                        path_tokens: vec![token_in, *base, token_out],
                        expected_output: U256::ZERO,
                    });
                }
            }
        }

        Ok(candidates)
    }

    /// Quote a candidate through QuoterV2.
    async fn quote(&self, candidate: &SwapRoute, amount_in: U256) -> Result<U256> {
        let quoter = self.addresses.quoter_v2;

        if candidate.is_direct() {
            let (token_in, token_out) = (candidate.path_tokens[0], candidate.path_tokens[1]);
            let fee = Uint::<24, 1>::from(candidate.hops[0].fee_tier);
            let amount_out = self
                .rpc
                .call("quoteExactInputSingle", |ep| async move {
                    let params = IQuoterV2::QuoteExactInputSingleParams {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        amountIn: amount_in,
                        fee,
                        sqrtPriceLimitX96: U160::ZERO,
                    };
                    let quoter = IQuoterV2::new(quoter, ep.provider());
                    Ok(quoter.quoteExactInputSingle(params).call().await?.amountOut)
                })
                .await?;
            Ok(amount_out)
        } else {
            let path = candidate.encode_path();
            let amount_out = self
                .rpc
                .call("quoteExactInput", |ep| {
                    let path = path.clone();
                    async move {
                        let quoter = IQuoterV2::new(quoter, ep.provider());
                        Ok(quoter.quoteExactInput(path, amount_in).call().await?.amountOut)
                    }
                })
                .await?;
            Ok(amount_out)
        }
    }
}

#[async_trait]
impl RouteProvider for IguanaV3Router {
    fn router_id(&self) -> &str {
        "iguana-v3"
    }

    #[instrument(skip(self), fields(router = "iguana-v3"))]
    async fn find_route(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<SwapRoute> {
        if token_in == token_out || amount_in.is_zero() {
            return Ok(SwapRoute::none());
        }

        let candidates = self.candidates(token_in, token_out).await?;
        debug!(count = candidates.len(), "Candidate paths found");

        let quotes = join_all(candidates.iter().map(|c| self.quote(c, amount_in))).await;

        let mut best: Option<(&SwapRoute, U256)> = None;
        for (candidate, quote) in candidates.iter().zip(quotes) {
            match quote {
                Ok(out) if best.map_or(true, |(_, b)| out > b) && !out.is_zero() => {
                    best = Some((candidate, out));
                }
                Ok(_) => {}
                Err(e) => {
                    // Quoter reverts when a pool lacks liquidity for the size.
                    debug!(hops = candidate.hops.len(), error = %e, "Quote failed");
                }
            }
        }

        Ok(match best {
            Some((candidate, expected_output)) => {
                debug!(
                    hops = candidate.hops.len(),
                    expected_output = %expected_output,
                    "Selected best route"
                );
                SwapRoute {
                    expected_output,
                    ..candidate.clone()
                }
            }
            None => SwapRoute::none(),
        })
    }
}
