//! Constant-product swap math in 256-bit integers.
//!
//! Every division floors, so outputs are biased down exactly like the
//! on-chain program; a minimum output derived here never exceeds what the
//! chain will pay for the same reserves.

use primitive_types::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::domain::pool::FeeRate;
use crate::shared::types::TokenAmount;
use crate::shared::utils::to_decimal;

pub const BPS_DENOMINATOR: u32 = 10_000;

/// Impact (in percent) above which the caller should warn
pub const CAUTION_IMPACT_PCT: Decimal = Decimal::ONE;
/// Impact (in percent) above which the caller must confirm explicitly
pub const BLOCKING_IMPACT_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMathError {
    #[error("reserve is empty")]
    EmptyReserve,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("slippage {0} bps is outside 0..=10000")]
    InvalidSlippage(u32),
}

/// Input left after the proportional fee, floored
pub fn effective_input(amount_in: TokenAmount, fee: FeeRate) -> Result<TokenAmount, SwapMathError> {
    let kept = U256::from(fee.denominator() - fee.numerator());
    let scaled = amount_in.0.checked_mul(kept).ok_or(SwapMathError::Overflow)?;
    Ok(TokenAmount(scaled / U256::from(fee.denominator())))
}

/// `reserve_out * effective_in / (reserve_in + effective_in)`, floored.
///
/// Strictly less than `reserve_out` and non-decreasing in `amount_in`.
pub fn compute_swap(
    amount_in: TokenAmount,
    reserve_in: TokenAmount,
    reserve_out: TokenAmount,
    fee: FeeRate,
) -> Result<TokenAmount, SwapMathError> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SwapMathError::EmptyReserve);
    }
    let effective_in = effective_input(amount_in, fee)?.0;
    let numerator = reserve_out.0.checked_mul(effective_in).ok_or(SwapMathError::Overflow)?;
    let denominator = reserve_in.0.checked_add(effective_in).ok_or(SwapMathError::Overflow)?;
    Ok(TokenAmount(numerator / denominator))
}

/// `floor(amount_out * (10000 - slippage_bps) / 10000)`
pub fn minimum_output(
    amount_out: TokenAmount,
    slippage_bps: u32,
) -> Result<TokenAmount, SwapMathError> {
    if slippage_bps > BPS_DENOMINATOR {
        return Err(SwapMathError::InvalidSlippage(slippage_bps));
    }
    let kept = U256::from(BPS_DENOMINATOR - slippage_bps);
    let scaled = amount_out.0.checked_mul(kept).ok_or(SwapMathError::Overflow)?;
    Ok(TokenAmount(scaled / U256::from(BPS_DENOMINATOR)))
}

/// `1 - (out / in) / (reserve_out / reserve_in)` as a percentage with two
/// decimals. Includes the fee, as the user experiences it.
pub fn price_impact_pct(
    amount_in: TokenAmount,
    amount_out: TokenAmount,
    reserve_in: TokenAmount,
    reserve_out: TokenAmount,
) -> Result<Decimal, SwapMathError> {
    if amount_in.is_zero() {
        return Ok(Decimal::ZERO);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(SwapMathError::EmptyReserve);
    }
    let spot_value = amount_in.0.checked_mul(reserve_out.0).ok_or(SwapMathError::Overflow)?;
    let realized = amount_out.0.checked_mul(reserve_in.0).ok_or(SwapMathError::Overflow)?;
    let shortfall = spot_value.saturating_sub(realized);

    // fraction in units of 1e-8, i.e. percent with six decimals
    let scaled = shortfall
        .checked_mul(U256::from(100_000_000u64))
        .ok_or(SwapMathError::Overflow)?
        / spot_value;
    let pct = Decimal::new(scaled.low_u64() as i64, 6);
    Ok(pct.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// How loudly a price impact must be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceImpactLevel {
    Normal,
    /// Above 1%
    Caution,
    /// Above 5%, needs explicit confirmation
    Blocking,
}

impl PriceImpactLevel {
    pub fn from_pct(pct: Decimal) -> Self {
        if pct > BLOCKING_IMPACT_PCT {
            PriceImpactLevel::Blocking
        } else if pct > CAUTION_IMPACT_PCT {
            PriceImpactLevel::Caution
        } else {
            PriceImpactLevel::Normal
        }
    }
}

/// Output per unit of input in human units, if representable
pub fn effective_price(
    amount_in: TokenAmount,
    amount_out: TokenAmount,
    decimals_in: u8,
    decimals_out: u8,
) -> Option<Decimal> {
    let input = to_decimal(amount_in, decimals_in)?;
    let output = to_decimal(amount_out, decimals_out)?;
    output.checked_div(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn fee() -> FeeRate {
        FeeRate::new(3, 1000).unwrap()
    }

    fn amt(v: u64) -> TokenAmount {
        TokenAmount::from(v)
    }

    #[test]
    fn test_reference_example() {
        // 10_000 * 997 / 1000 = 9970
        assert_eq!(effective_input(amt(10_000), fee()).unwrap(), amt(9_970));
        // 500_000 * 9970 / 1_009_970 = 4935.79... -> 4935
        let out = compute_swap(amt(10_000), amt(1_000_000), amt(500_000), fee()).unwrap();
        assert_eq!(out, amt(4_935));
        // 4935 * 0.99 = 4885.65 -> 4885
        assert_eq!(minimum_output(out, 100).unwrap(), amt(4_885));
    }

    #[test]
    fn test_empty_reserve_rejected() {
        assert_eq!(
            compute_swap(amt(10), amt(0), amt(500), fee()),
            Err(SwapMathError::EmptyReserve)
        );
        assert_eq!(
            compute_swap(amt(10), amt(500), amt(0), fee()),
            Err(SwapMathError::EmptyReserve)
        );
    }

    #[test]
    fn test_never_drains_pool() {
        let huge = TokenAmount::from(u64::MAX);
        let out = compute_swap(huge, amt(1), amt(1_000), fee()).unwrap();
        assert!(out < amt(1_000));

        let max_in = TokenAmount::from(u128::MAX);
        let out = compute_swap(max_in, amt(u64::MAX), amt(u64::MAX), fee()).unwrap();
        assert!(out < amt(u64::MAX));
    }

    #[test]
    fn test_monotonic_in_input() {
        let (reserve_in, reserve_out) = (amt(1_000_000), amt(500_000));
        let mut last = TokenAmount::zero();
        for input in (0..200_000u64).step_by(997) {
            let out = compute_swap(amt(input), reserve_in, reserve_out, fee()).unwrap();
            assert!(out >= last, "output dropped at input {}", input);
            assert!(out < reserve_out);
            last = out;
        }
    }

    #[test]
    fn test_no_overflow_at_u64_extremes() {
        let no_fee = FeeRate::new(0, 1).unwrap();
        let out = compute_swap(amt(u64::MAX), amt(u64::MAX), amt(u64::MAX), no_fee).unwrap();
        // exactly half, floored
        assert_eq!(out, amt(u64::MAX / 2));
    }

    #[test]
    fn test_minimum_output_bounds() {
        let out = amt(4_935);
        assert_eq!(minimum_output(out, 0).unwrap(), out);
        for bps in [1u32, 50, 100, 300, 5_000, 9_999] {
            assert!(minimum_output(out, bps).unwrap() < out, "bps {}", bps);
        }
        assert_eq!(minimum_output(out, 10_000).unwrap(), TokenAmount::zero());
        assert_eq!(minimum_output(out, 10_001), Err(SwapMathError::InvalidSlippage(10_001)));
    }

    #[test]
    fn test_price_impact() {
        let (reserve_in, reserve_out) = (amt(1_000_000), amt(500_000));
        let out = compute_swap(amt(10_000), reserve_in, reserve_out, fee()).unwrap();
        // 1 - (4935 * 1_000_000) / (10_000 * 500_000) = 0.013 -> 1.30%
        let pct = price_impact_pct(amt(10_000), out, reserve_in, reserve_out).unwrap();
        assert_eq!(pct, Decimal::from_str("1.30").unwrap());
        assert_eq!(PriceImpactLevel::from_pct(pct), PriceImpactLevel::Caution);

        let none = price_impact_pct(amt(0), amt(0), reserve_in, reserve_out).unwrap();
        assert_eq!(none, Decimal::ZERO);
    }

    #[test]
    fn test_impact_levels() {
        let level = |pct: &str| PriceImpactLevel::from_pct(Decimal::from_str(pct).unwrap());
        assert_eq!(level("0.99"), PriceImpactLevel::Normal);
        assert_eq!(level("1"), PriceImpactLevel::Normal);
        assert_eq!(level("1.01"), PriceImpactLevel::Caution);
        assert_eq!(level("5"), PriceImpactLevel::Caution);
        assert_eq!(level("5.01"), PriceImpactLevel::Blocking);
    }

    #[test]
    fn test_effective_price() {
        // 1 SOL (9 decimals) -> 150.5 USDC (6 decimals)
        let price = effective_price(amt(1_000_000_000), amt(150_500_000), 9, 6).unwrap();
        assert_eq!(price, Decimal::from_str("150.5").unwrap());
    }
}
