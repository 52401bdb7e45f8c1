//! Per-shard quoting and best-route selection. Pure, no I/O.

use tracing::{debug, warn};

use super::swap_math::{self, SwapMathError};
use super::{RejectedShard, ShardQuote};
use crate::domain::pool::{Pool, Resolution, SwapDirection};
use crate::shared::errors::{QuoteError, ShardFailure};
use crate::shared::types::TokenAmount;

/// Quote one shard against its resolved reserves.
///
/// Pools with an empty reserve are rejected with `NoLiquidity`.
pub fn quote_shard(
    pool: &Pool,
    direction: SwapDirection,
    resolution: &Resolution,
    amount_in: TokenAmount,
    slippage_bps: u32,
) -> Result<ShardQuote, QuoteError> {
    let map_err = |err: SwapMathError| match err {
        SwapMathError::EmptyReserve => QuoteError::NoLiquidity {
            pool_id: pool.id.clone(),
        },
        SwapMathError::InvalidSlippage(bps) => QuoteError::InvalidSlippage(bps),
        SwapMathError::Overflow => QuoteError::ArithmeticOverflow {
            pool_id: pool.id.clone(),
            amount: amount_in.to_string(),
        },
    };

    if !resolution.snapshot.has_liquidity() {
        return Err(QuoteError::NoLiquidity {
            pool_id: pool.id.clone(),
        });
    }

    let (reserve_in, reserve_out) = direction.orient(&resolution.snapshot);
    let amount_out =
        swap_math::compute_swap(amount_in, reserve_in, reserve_out, pool.fee).map_err(map_err)?;
    let priced = swap_math::minimum_output(amount_out, slippage_bps).and_then(|minimum| {
        swap_math::price_impact_pct(amount_in, amount_out, reserve_in, reserve_out)
            .map(|pct| (minimum, pct))
    });
    let (minimum_output, price_impact_pct) = match priced {
        Ok(priced) => priced,
        Err(err) => {
            warn!(
                pool = %pool.id,
                amount_in = %amount_in,
                expected_output = %amount_out,
                slippage_bps,
                error = %err,
                "Shard quote failed after computing output"
            );
            return Err(map_err(err));
        }
    };

    debug!(
        pool = %pool.id,
        shard = pool.shard,
        provenance = %resolution.provenance(),
        amount_in = %amount_in,
        amount_out = %amount_out,
        minimum_output = %minimum_output,
        "Quoted shard"
    );

    Ok(ShardQuote {
        pool_id: pool.id.clone(),
        shard: pool.shard,
        provenance: resolution.provenance(),
        reserve_in,
        reserve_out,
        amount_out,
        minimum_output,
        price_impact_pct,
        fallback_reason: resolution.fallback.as_ref().map(ToString::to_string),
    })
}

/// Outcome of comparing every shard of a pair
#[derive(Debug, Clone)]
pub struct RouteSelection {
    pub best: ShardQuote,
    /// Every successful shard, in shard order
    pub quotes: Vec<ShardQuote>,
    pub rejected: Vec<RejectedShard>,
}

/// Highest output wins; ties go to the lowest shard number.
///
/// Fails with every shard's reason when none produced a quote.
pub fn select_best_route(
    candidates: Vec<Result<ShardQuote, ShardFailure>>,
) -> Result<RouteSelection, QuoteError> {
    let mut quotes = Vec::new();
    let mut failures = Vec::new();
    for candidate in candidates {
        match candidate {
            Ok(quote) => quotes.push(quote),
            Err(failure) => failures.push(failure),
        }
    }
    quotes.sort_by_key(|q| q.shard);
    failures.sort_by_key(|f| f.shard);

    let best = quotes
        .iter()
        .fold(None::<&ShardQuote>, |best, candidate| match best {
            Some(current) if current.amount_out >= candidate.amount_out => Some(current),
            _ => Some(candidate),
        })
        .cloned();

    match best {
        Some(best) => Ok(RouteSelection {
            best,
            quotes,
            rejected: failures.iter().map(RejectedShard::from).collect(),
        }),
        None => Err(QuoteError::AllShardsFailed { failures }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pool::{fixtures, FallbackReason};
    use crate::shared::errors::ChainError;
    use crate::shared::types::{Provenance, ReserveSnapshot};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn live(reserve_a: u64, reserve_b: u64) -> Resolution {
        Resolution {
            snapshot: ReserveSnapshot::live(reserve_a.into(), reserve_b.into(), Utc::now()),
            fallback: None,
        }
    }

    fn shard_quote(shard: u16, amount_out: u64) -> ShardQuote {
        ShardQuote {
            pool_id: format!("pool-{}", shard),
            shard,
            provenance: Provenance::Live,
            reserve_in: 1u64.into(),
            reserve_out: 1u64.into(),
            amount_out: amount_out.into(),
            minimum_output: amount_out.into(),
            price_impact_pct: Decimal::ZERO,
            fallback_reason: None,
        }
    }

    fn failure(shard: u16) -> ShardFailure {
        ShardFailure {
            pool_id: format!("pool-{}", shard),
            shard,
            error: QuoteError::NoLiquidity {
                pool_id: format!("pool-{}", shard),
            },
            chain_failure: None,
        }
    }

    #[test]
    fn test_quote_shard_reference_values() {
        let pool = fixtures::pool("sol-usdc-0", 0, "1", "1");
        let reserves = live(1_000_000, 500_000);
        let quote =
            quote_shard(&pool, SwapDirection::AToB, &reserves, 10_000u64.into(), 100).unwrap();
        assert_eq!(quote.amount_out, TokenAmount::from(4_935u64));
        assert_eq!(quote.minimum_output, TokenAmount::from(4_885u64));
        assert_eq!(quote.reserve_in, TokenAmount::from(1_000_000u64));
        assert_eq!(quote.provenance, Provenance::Live);
    }

    #[test]
    fn test_quote_shard_reverse_direction() {
        let pool = fixtures::pool("sol-usdc-0", 0, "1", "1");
        let reserves = live(500_000, 1_000_000);
        let quote =
            quote_shard(&pool, SwapDirection::BToA, &reserves, 10_000u64.into(), 0).unwrap();
        assert_eq!(quote.amount_out, TokenAmount::from(4_935u64));
        assert_eq!(quote.minimum_output, quote.amount_out);
    }

    #[test]
    fn test_zero_reserve_is_no_liquidity() {
        let pool = fixtures::pool("sol-usdc-0", 0, "1", "1");
        let err = quote_shard(&pool, SwapDirection::AToB, &live(0, 500_000), 10u64.into(), 100)
            .unwrap_err();
        assert!(matches!(err, QuoteError::NoLiquidity { pool_id } if pool_id == "sol-usdc-0"));
    }

    #[test]
    fn test_fallback_reason_is_carried() {
        let pool = fixtures::pool("sol-usdc-0", 0, "1", "1");
        let resolution = Resolution {
            snapshot: ReserveSnapshot::stale(1_000u64.into(), 1_000u64.into(), Utc::now()),
            fallback: Some(FallbackReason::Chain(ChainError::AccountNotFound {
                account: "Vault111".to_string(),
            })),
        };
        let quote =
            quote_shard(&pool, SwapDirection::AToB, &resolution, 10u64.into(), 100).unwrap();
        assert_eq!(quote.provenance, Provenance::StaleFallback);
        assert!(quote.fallback_reason.unwrap().contains("account_not_found"));
    }

    #[test]
    fn test_best_route_highest_output() {
        let selection = select_best_route(vec![
            Ok(shard_quote(2, 90)),
            Ok(shard_quote(0, 100)),
            Err(failure(3)),
            Ok(shard_quote(1, 120)),
        ])
        .unwrap();
        assert_eq!(selection.best.shard, 1);
        let order: Vec<u16> = selection.quotes.iter().map(|q| q.shard).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(selection.rejected.len(), 1);
        assert_eq!(selection.rejected[0].shard, 3);
    }

    #[test]
    fn test_best_route_tie_prefers_lowest_shard() {
        let selection =
            select_best_route(vec![Ok(shard_quote(4, 100)), Ok(shard_quote(2, 100))]).unwrap();
        assert_eq!(selection.best.shard, 2);
    }

    #[test]
    fn test_zero_reserve_shard_excluded_from_selection() {
        let empty_pool = fixtures::pool("sol-usdc-0", 0, "1", "1");
        let healthy_pool = fixtures::pool("sol-usdc-1", 1, "1", "1");
        let candidates = vec![
            (&empty_pool, live(0, 500_000)),
            (&healthy_pool, live(1_000, 500)),
        ]
        .into_iter()
        .map(|(pool, resolution)| {
            quote_shard(pool, SwapDirection::AToB, &resolution, 10u64.into(), 100).map_err(|error| {
                ShardFailure {
                    pool_id: pool.id.clone(),
                    shard: pool.shard,
                    error,
                    chain_failure: None,
                }
            })
        })
        .collect();

        let selection = select_best_route(candidates).unwrap();
        assert_eq!(selection.best.shard, 1);
        assert_eq!(selection.rejected[0].pool_id, "sol-usdc-0");
    }

    #[test]
    fn test_all_shards_failed() {
        let err = select_best_route(vec![Err(failure(1)), Err(failure(0))]).unwrap_err();
        match err {
            QuoteError::AllShardsFailed { failures } => {
                assert_eq!(failures.iter().map(|f| f.shard).collect::<Vec<_>>(), vec![0, 1]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
