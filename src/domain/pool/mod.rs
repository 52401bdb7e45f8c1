//! Pool domain - static pool definitions, reserve resolution and the aggregate store

mod catalog;
mod pool_manager;
mod pool_resolver;

pub use catalog::Catalog;
pub use pool_manager::{
    AggregateState, PoolEntry, PoolManager, PoolRefreshFailure, RefreshOutcome, RefreshReport,
};
pub use pool_resolver::{FallbackReason, PoolStateResolver, Resolution};

use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::shared::errors::QuoteError;
use crate::shared::types::{ReserveSnapshot, Token, TokenAmount};
use crate::shared::utils::serialize_display;

/// Proportional trade fee, e.g. 3/1000 = 0.3%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FeeRate {
    numerator: u64,
    denominator: u64,
}

impl FeeRate {
    /// Requires `denominator > 0` and `numerator < denominator`
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, QuoteError> {
        if denominator == 0 || numerator >= denominator {
            return Err(QuoteError::InvalidFee { numerator, denominator });
        }
        Ok(Self { numerator, denominator })
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    /// Fee as a percentage, for display
    pub fn as_percent(&self) -> Decimal {
        Decimal::from(self.numerator) * Decimal::ONE_HUNDRED / Decimal::from(self.denominator)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percent().normalize())
    }
}

/// Which way a swap crosses a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SwapDirection {
    AToB,
    BToA,
}

impl SwapDirection {
    /// `(reserve_in, reserve_out)` for this direction
    pub fn orient(&self, snapshot: &ReserveSnapshot) -> (TokenAmount, TokenAmount) {
        match self {
            SwapDirection::AToB => (snapshot.reserve_a, snapshot.reserve_b),
            SwapDirection::BToA => (snapshot.reserve_b, snapshot.reserve_a),
        }
    }
}

/// A constant-product pool as loaded from static configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pool {
    pub id: String,
    pub token_a: Token,
    pub token_b: Token,
    #[serde(serialize_with = "serialize_display")]
    pub token_a_account: Pubkey,
    #[serde(serialize_with = "serialize_display")]
    pub token_b_account: Pubkey,
    #[serde(serialize_with = "serialize_display")]
    pub lp_mint: Pubkey,
    pub fee: FeeRate,
    /// Disambiguates several pools for the same pair
    pub shard: u16,
    /// Human-readable liquidity used when the chain cannot be reached
    pub fallback_liquidity_a: Decimal,
    pub fallback_liquidity_b: Decimal,
}

impl Pool {
    /// Direction for `input -> output` symbols, if this pool trades that pair
    pub fn direction(&self, input: &str, output: &str) -> Option<SwapDirection> {
        let is_a = |s: &str| self.token_a.symbol.eq_ignore_ascii_case(s);
        let is_b = |s: &str| self.token_b.symbol.eq_ignore_ascii_case(s);
        if is_a(input) && is_b(output) {
            Some(SwapDirection::AToB)
        } else if is_b(input) && is_a(output) {
            Some(SwapDirection::BToA)
        } else {
            None
        }
    }

    pub fn pair_label(&self) -> String {
        format!("{}/{}", self.token_a.symbol, self.token_b.symbol)
    }
}
