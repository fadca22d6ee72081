//! Etherlink token registry.
//!
//! Tokens the liquidator knows how to route through, with their decimals.
//! Base tokens are the deep-liquidity assets used as intermediate hops.

use alloy::primitives::{address, Address};

/// Static token metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token symbol (e.g., "WXTZ", "USDC")
    pub symbol: &'static str,
    /// Token contract address
    pub address: Address,
    /// Token decimals
    pub decimals: u8,
    /// Whether the token is a USD stablecoin
    pub stable: bool,
}

impl Token {
    const fn new(symbol: &'static str, address: Address, decimals: u8, stable: bool) -> Self {
        Self {
            symbol,
            address,
            decimals,
            stable,
        }
    }
}

/// WXTZ - Wrapped XTZ (native token)
pub const WXTZ: Token = Token::new(
    "WXTZ",
    address!("c9b53ab2679f573e480d01e0f49e2b5cfb7a3eab"),
    18,
    false,
);

/// USDT - Tether USD
pub const USDT: Token = Token::new(
    "USDT",
    address!("2c03058c8afc06713be23e58d2febc8337dbfe6a"),
    6,
    true,
);

/// USDC - USD Coin
pub const USDC: Token = Token::new(
    "USDC",
    address!("796ea11fa2dd751ed01b53c372ffdb4aaa8f00f9"),
    6,
    true,
);

/// WETH - Wrapped Ether
pub const WETH: Token = Token::new(
    "WETH",
    address!("fc24f770f94edbca6d6f885e12d4317320bcb401"),
    18,
    false,
);

/// WBTC - Wrapped Bitcoin
pub const WBTC: Token = Token::new(
    "WBTC",
    address!("bfc94cd2b1e55999cfc7347a9313e88702b83d0f"),
    8,
    false,
);

pub const MBASIS: Token = Token::new(
    "mBASIS",
    address!("2247b5a46bb79421a314ab0f0b67ffd11dd37ee4"),
    18,
    false,
);

pub const MTBILL: Token = Token::new(
    "mTBILL",
    address!("dd629e5241cbc5919847783e6c96b2de4754e438"),
    18,
    false,
);

pub const LBTC: Token = Token::new(
    "LBTC",
    address!("ecac9c5f704e954931349da37f60e39f515c11c1"),
    8,
    false,
);

pub const STXTZ: Token = Token::new(
    "stXTZ",
    address!("01f07f4d78d47a64f4c3b2b65f513f15be6e1854"),
    6,
    false,
);

/// All known Etherlink tokens.
pub const ETHERLINK_TOKENS: [Token; 9] = [
    WXTZ, USDT, USDC, WETH, WBTC, MBASIS, MTBILL, LBTC, STXTZ,
];

/// Intermediate tokens tried for two-hop routes, in preference order.
pub const BASE_TOKENS: [Address; 3] = [WXTZ.address, USDC.address, USDT.address];

/// Look up a token by address.
pub fn token_by_address(address: &Address) -> Option<&'static Token> {
    ETHERLINK_TOKENS.iter().find(|t| t.address == *address)
}

/// Check whether a token is a known stablecoin.
pub fn is_stablecoin(address: &Address) -> bool {
    token_by_address(address).is_some_and(|t| t.stable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_address() {
        let usdc: Address = "0x796Ea11Fa2dD751eD01b53C372fFDB4AAa8f00F9".parse().unwrap();
        let token = token_by_address(&usdc).unwrap();
        assert_eq!(token.symbol, "USDC");
        assert_eq!(token.decimals, 6);
        assert!(is_stablecoin(&usdc));
        assert!(!is_stablecoin(&WXTZ.address));
        assert!(token_by_address(&Address::ZERO).is_none());
    }

    #[test]
    fn test_base_tokens_are_registered() {
        for base in BASE_TOKENS {
            assert!(token_by_address(&base).is_some());
        }
    }
}
