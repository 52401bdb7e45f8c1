//! Quote domain - swap math, per-shard quotes and route selection

mod quote_engine;
mod swap_math;

pub use quote_engine::{quote_shard, select_best_route, RouteSelection};
pub use swap_math::{
    compute_swap, effective_input, effective_price, minimum_output, price_impact_pct,
    PriceImpactLevel, SwapMathError, BLOCKING_IMPACT_PCT, BPS_DENOMINATOR, CAUTION_IMPACT_PCT,
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::shared::errors::ShardFailure;
use crate::shared::types::{Provenance, Token, TokenAmount};

/// Quote produced by a single shard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardQuote {
    pub pool_id: String,
    pub shard: u16,
    pub provenance: Provenance,
    pub reserve_in: TokenAmount,
    pub reserve_out: TokenAmount,
    pub amount_out: TokenAmount,
    pub minimum_output: TokenAmount,
    pub price_impact_pct: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// A shard that could not be quoted
#[derive(Debug, Clone, Serialize)]
pub struct RejectedShard {
    pub pool_id: String,
    pub shard: u16,
    pub reason: String,
}

impl From<&ShardFailure> for RejectedShard {
    fn from(failure: &ShardFailure) -> Self {
        let reason = match &failure.chain_failure {
            Some(chain) => format!("{} (after {})", failure.error, chain.kind()),
            None => failure.error.to_string(),
        };
        Self {
            pool_id: failure.pool_id.clone(),
            shard: failure.shard,
            reason,
        }
    }
}

/// Final quote for a swap request, routed through the best shard
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub id: Uuid,
    pub input_token: Token,
    pub output_token: Token,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    pub minimum_output: TokenAmount,
    pub slippage_bps: u32,
    pub price_impact_pct: Decimal,
    pub price_impact_level: PriceImpactLevel,
    /// Output per input unit in human units
    pub effective_price: Option<Decimal>,
    pub route: ShardQuote,
    /// Every shard that produced a quote, in shard order
    pub shards: Vec<ShardQuote>,
    pub rejected: Vec<RejectedShard>,
    pub computed_at: DateTime<Utc>,
}

impl Quote {
    pub fn provenance(&self) -> Provenance {
        self.route.provenance
    }

    pub fn is_stale(&self) -> bool {
        self.route.provenance == Provenance::StaleFallback
    }
}
