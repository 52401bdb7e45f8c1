//! Common types used across the application

use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::shared::utils::serialize_display;

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Token {
    #[serde(serialize_with = "serialize_display")]
    pub mint: Pubkey,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(
        mint: Pubkey,
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            mint,
            symbol: symbol.into(),
            name: name.into(),
            decimals,
        }
    }
}

/// Amount in base units (smallest indivisible denomination of a token).
///
/// Backed by a 256-bit unsigned integer so that products of two on-chain u64
/// balances and a fee factor never overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for TokenAmount {
    fn from(v: u64) -> Self {
        Self(U256::from(v))
    }
}

impl From<u128> for TokenAmount {
    fn from(v: u128) -> Self {
        Self(U256::from(v))
    }
}

impl From<U256> for TokenAmount {
    fn from(v: U256) -> Self {
        Self(v)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a reserve snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    StaleFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Live => "live",
            Provenance::StaleFallback => "stale-fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reserve balances of one pool at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReserveSnapshot {
    pub reserve_a: TokenAmount,
    pub reserve_b: TokenAmount,
    pub captured_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl ReserveSnapshot {
    pub fn live(
        reserve_a: TokenAmount,
        reserve_b: TokenAmount,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reserve_a,
            reserve_b,
            captured_at,
            provenance: Provenance::Live,
        }
    }

    pub fn stale(
        reserve_a: TokenAmount,
        reserve_b: TokenAmount,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reserve_a,
            reserve_b,
            captured_at,
            provenance: Provenance::StaleFallback,
        }
    }

    /// Both sides must hold something before the pool can be priced
    pub fn has_liquidity(&self) -> bool {
        !self.reserve_a.is_zero() && !self.reserve_b.is_zero()
    }

    /// Same reserves, re-tagged
    pub fn with_provenance(&self, provenance: Provenance) -> Self {
        Self {
            provenance,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_amount_serializes_as_decimal_string() {
        let amount = TokenAmount::from(u128::MAX);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
    }

    #[test]
    fn test_snapshot_liquidity() {
        let now = Utc::now();
        assert!(ReserveSnapshot::live(10u64.into(), 20u64.into(), now).has_liquidity());
        assert!(!ReserveSnapshot::live(0u64.into(), 20u64.into(), now).has_liquidity());

        let stale = ReserveSnapshot::live(1u64.into(), 1u64.into(), now)
            .with_provenance(Provenance::StaleFallback);
        assert_eq!(stale.provenance, Provenance::StaleFallback);
        assert_eq!(stale.provenance.to_string(), "stale-fallback");
    }
}
