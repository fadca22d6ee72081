//! Swap routing abstractions for liquidation.
//!
//! The execution layer only needs to know which pools a route goes through
//! and their fee tiers, so routers return a small [`SwapRoute`] value object
//! instead of router-library types.
//!
//! # Supported Routers
//!
//! - `iguana_v3`: IguanaDEX V3 (Etherlink), quoted on-chain through QuoterV2
//!
//! # Example
//!
//! ```rust,ignore
//! use liquidator_api::swap::{IguanaV3Router, RouteProvider};
//!
//! let router = IguanaV3Router::new(rpc.clone(), addresses);
//! let route = router.find_route(collateral, debt, amount).await?;
//! if route.is_empty() {
//!     // no liquidity path
//! }
//! ```

mod iguana_v3;

pub use iguana_v3::{FeeTier, IguanaV3Addresses, IguanaV3Router};

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use smallvec::SmallVec;
use std::fmt::Debug;

/// Maximum number of pools in a route.
pub const MAX_HOPS: usize = 2;

/// One pool traversed by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHop {
    /// Pool contract address
    pub pool: Address,
    /// Fee tier (in hundredths of basis points, e.g., 2500 = 0.25%)
    pub fee_tier: u32,
}

/// Best-effort swap route for one (token_in, token_out, amount) query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapRoute {
    /// Pools in swap order (empty = no route)
    pub hops: SmallVec<[PoolHop; MAX_HOPS]>,
    /// Tokens along the path, `hops.len() + 1` entries when non-empty
    pub path_tokens: Vec<Address>,
    /// Quoted output amount (raw, output token decimals)
    pub expected_output: U256,
}

impl SwapRoute {
    /// A route with zero hops.
    pub fn none() -> Self {
        Self::default()
    }

    /// Check if no liquidity path was found.
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Check if this is a direct swap (single hop).
    pub fn is_direct(&self) -> bool {
        self.hops.len() == 1
    }

    /// Intermediate token for a two-hop route.
    pub fn intermediate_token(&self) -> Option<Address> {
        if self.hops.len() > 1 {
            self.path_tokens.get(1).copied()
        } else {
            None
        }
    }

    /// Encode the route as a V3 packed path: `token (20) | fee (3) | token (20) ...`.
    pub fn encode_path(&self) -> Bytes {
        encode_v3_path(
            &self.path_tokens,
            &self.hops.iter().map(|h| h.fee_tier).collect::<Vec<_>>(),
        )
    }
}

/// Encode tokens and fees into a V3 packed path.
pub fn encode_v3_path(tokens: &[Address], fees: &[u32]) -> Bytes {
    let mut path = Vec::with_capacity(tokens.len() * 20 + fees.len() * 3);
    for (i, token) in tokens.iter().enumerate() {
        path.extend_from_slice(token.as_slice());
        if let Some(fee) = fees.get(i) {
            path.extend_from_slice(&fee.to_be_bytes()[1..]);
        }
    }
    Bytes::from(path)
}

/// Capability for resolving swap routes.
///
/// Implement this trait to plug in a different DEX or aggregator; the
/// execution coordinator never sees router-specific types.
#[async_trait]
pub trait RouteProvider: Send + Sync + Debug {
    /// Get the router identifier (e.g., "iguana-v3").
    fn router_id(&self) -> &str;

    /// Find the best route for swapping `amount_in` of `token_in` into `token_out`.
    ///
    /// Returns a route with zero hops when no liquidity path exists. Errors
    /// are reserved for transport failures.
    async fn find_route(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<SwapRoute>;
}
