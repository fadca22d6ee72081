//! Off-chain routing support for Etherlink liquidations.
//!
//! This crate provides:
//! - Swap routing through IguanaDEX V3 (factory discovery + QuoterV2 quotes)
//! - The Etherlink token registry used for routing decisions

pub mod swap;
pub mod tokens;

pub use swap::{encode_v3_path, FeeTier, IguanaV3Addresses, IguanaV3Router, PoolHop, RouteProvider, SwapRoute};
pub use tokens::{token_by_address, Token, BASE_TOKENS, ETHERLINK_TOKENS};
