//! Decimal-safe conversion between floating token amounts and base units.
//!
//! Amounts sent on-chain must be integers in the token's base units. Going
//! through the shortest decimal representation of the float and truncating
//! the fraction to `decimals` digits keeps the result from ever rounding up
//! past what the float actually says.

use alloy::primitives::U256;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: f64 = 10_000.0;

/// Convert a token amount to base units at `decimals` precision.
///
/// The fractional part is padded or truncated to exactly `decimals` digits,
/// never rounded. Returns `None` for negative or non-finite input.
///
/// Example: `to_base_units(952.3809523809524, 6) == Some(952_380_952)`
pub fn to_base_units(amount: f64, decimals: u8) -> Option<U256> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }

    // f64 Display never uses exponent notation.
    let repr = amount.to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));

    let decimals = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(decimals - frac_part.len()));
    }

    U256::from_str_radix(&digits, 10).ok()
}

/// Convert base units to a float token amount (for logging and valuation).
pub fn from_base_units(amount: U256, decimals: u8) -> f64 {
    amount.to_string().parse::<f64>().unwrap_or(0.0) / 10_f64.powi(decimals as i32)
}
