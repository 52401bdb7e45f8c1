//! Utility functions and helpers

use primitive_types::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serializer;
use std::fmt::Display;
use tracing::debug;

use crate::shared::errors::QuoteError;
use crate::shared::types::TokenAmount;

/// Serialize any `Display` value as a string (pubkeys, addresses)
pub fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// 10^exp, or `None` when it does not fit in 256 bits
pub fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Convert a human-readable amount into base units exactly.
///
/// Fails if the amount is negative, carries more significant fractional
/// digits than the token allows, or overflows.
pub fn to_base_units(value: Decimal, decimals: u8) -> Result<TokenAmount, QuoteError> {
    convert(value, decimals, false)
}

/// Like [`to_base_units`] but drops excess fractional digits toward zero
pub fn to_base_units_truncated(value: Decimal, decimals: u8) -> Result<TokenAmount, QuoteError> {
    convert(value, decimals, true)
}

fn convert(value: Decimal, decimals: u8, truncate: bool) -> Result<TokenAmount, QuoteError> {
    let fail = |reason: &str| QuoteError::DecimalConversion {
        value: value.to_string(),
        decimals,
        reason: reason.to_string(),
    };

    if value < Decimal::ZERO {
        return Err(fail("negative amount"));
    }

    let precision = u32::from(decimals);
    let mut normalized = value.normalize();
    if normalized.scale() > precision {
        if !truncate {
            return Err(fail("more fractional digits than the token precision"));
        }
        normalized = normalized.round_dp_with_strategy(precision, RoundingStrategy::ToZero);
    }

    // Non-negative after the sign check above
    let mantissa = normalized.mantissa().unsigned_abs();
    let factor =
        pow10(precision - normalized.scale()).ok_or_else(|| fail("10^decimals overflows"))?;
    let base = U256::from(mantissa)
        .checked_mul(factor)
        .ok_or_else(|| fail("base-unit value overflows"))?;

    debug!(
        original = %value,
        decimals,
        base_units = %base,
        truncated = truncate,
        "Converted amount to base units"
    );
    Ok(TokenAmount(base))
}

/// Render a base-unit amount in human units without going through floats
pub fn format_base_units(amount: TokenAmount, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let width = usize::from(decimals);
    let (whole, frac) = match pow10(u32::from(decimals)) {
        Some(factor) => (amount.0 / factor, amount.0 % factor),
        None => (U256::zero(), amount.0),
    };
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = width);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Human-unit `Decimal` for an amount, if it fits in 28 significant digits
pub fn to_decimal(amount: TokenAmount, decimals: u8) -> Option<Decimal> {
    if amount.0 > U256::from(u128::MAX) {
        return None;
    }
    let mantissa = i128::try_from(amount.0.as_u128()).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, u32::from(decimals)).ok()
}
