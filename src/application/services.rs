//! Application services and use cases

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::pool::{
    AggregateState, Catalog, FallbackReason, Pool, PoolManager, PoolStateResolver, RefreshOutcome,
    Resolution,
};
use crate::domain::quote::{
    effective_price, quote_shard, select_best_route, PriceImpactLevel, Quote, BPS_DENOMINATOR,
};
use crate::infrastructure::blockchain::ChainReader;
use crate::infrastructure::cache::{ReserveCache, DEFAULT_RESERVE_TTL_MS};
use crate::shared::config::{Config, QuoteCfg};
use crate::shared::errors::{AppError, QuoteError, ShardFailure};
use crate::shared::types::TokenAmount;
use crate::shared::utils::to_base_units;

/// Longest pause the refresh loop takes after being rate limited, in intervals
const MAX_BACKOFF_INTERVALS: u32 = 8;

/// Quotes, refreshes and cached pool state over one set of injected components
pub struct QuoteService {
    catalog: Arc<Catalog>,
    resolver: Arc<PoolStateResolver>,
    store: Arc<PoolManager>,
    settings: QuoteCfg,
}

impl QuoteService {
    pub fn new(catalog: Catalog, reader: Arc<dyn ChainReader>, settings: QuoteCfg) -> Self {
        if settings.cache_ttl_overridden() {
            warn!(
                cache_ttl_ms = settings.cache_ttl_ms,
                default_ms = DEFAULT_RESERVE_TTL_MS,
                "Reserve cache TTL overridden"
            );
        }
        let cache = Arc::new(ReserveCache::new(settings.cache_ttl()));
        Self {
            catalog: Arc::new(catalog),
            resolver: Arc::new(PoolStateResolver::new(reader, cache)),
            store: Arc::new(PoolManager::new(settings.staleness_threshold())),
            settings,
        }
    }

    pub fn from_config(cfg: &Config, reader: Arc<dyn ChainReader>) -> Result<Self, AppError> {
        let catalog = Catalog::from_config(cfg)?;
        info!(
            tokens = catalog.tokens().len(),
            pools = catalog.pools().len(),
            "Loaded token and pool catalog"
        );
        Ok(Self::new(catalog, reader, cfg.quote.clone()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &QuoteCfg {
        &self.settings
    }

    /// Quote with the configured slippage tolerance
    pub async fn get_quote(
        &self,
        input: &str,
        output: &str,
        amount: Decimal,
    ) -> Result<Quote, QuoteError> {
        self.get_quote_with_slippage(input, output, amount, None).await
    }

    pub async fn get_quote_with_slippage(
        &self,
        input: &str,
        output: &str,
        amount: Decimal,
        slippage_bps: Option<u32>,
    ) -> Result<Quote, QuoteError> {
        self.get_quote_at(input, output, amount, slippage_bps, Utc::now()).await
    }

    /// Quote `amount` (human units) of `input` into `output` as of `now`.
    ///
    /// Shards are resolved concurrently under the quote deadline; a shard that
    /// misses it is priced from static configuration instead.
    pub async fn get_quote_at(
        &self,
        input: &str,
        output: &str,
        amount: Decimal,
        slippage_bps: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Quote, QuoteError> {
        let slippage_bps = slippage_bps.unwrap_or(self.settings.slippage_bps);
        let result = self.compute_quote(input, output, amount, slippage_bps, now).await;
        if let Err(err) = &result {
            warn!(
                input = %input,
                output = %output,
                amount = %amount,
                slippage_bps,
                error = %err,
                "Quote failed"
            );
        }
        result
    }

    async fn compute_quote(
        &self,
        input: &str,
        output: &str,
        amount: Decimal,
        slippage_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<Quote, QuoteError> {
        if slippage_bps > BPS_DENOMINATOR {
            return Err(QuoteError::InvalidSlippage(slippage_bps));
        }
        let input_token = self
            .catalog
            .token(input)
            .ok_or_else(|| QuoteError::UnknownToken(input.to_string()))?
            .clone();
        let output_token = self
            .catalog
            .token(output)
            .ok_or_else(|| QuoteError::UnknownToken(output.to_string()))?
            .clone();

        let amount_in = to_base_units(amount, input_token.decimals)?;
        if amount_in.is_zero() {
            return Err(QuoteError::ZeroAmount);
        }

        let shards = self.catalog.pools_for_pair(&input_token.symbol, &output_token.symbol);
        if shards.is_empty() {
            return Err(QuoteError::NoPoolForPair {
                input: input_token.symbol.clone(),
                output: output_token.symbol.clone(),
            });
        }

        let deadline = Instant::now() + self.settings.deadline();
        let resolutions =
            join_all(shards.iter().map(|(pool, _)| self.resolve_within(pool, now, deadline))).await;

        let candidates = shards
            .iter()
            .zip(resolutions)
            .map(|((pool, direction), resolution)| {
                let failure = |error: QuoteError, source: Option<&Resolution>| ShardFailure {
                    pool_id: pool.id.clone(),
                    shard: pool.shard,
                    error,
                    chain_failure: source
                        .and_then(|r| r.fallback.as_ref())
                        .and_then(FallbackReason::chain_error)
                        .cloned(),
                };
                match resolution {
                    Ok(resolution) => {
                        quote_shard(pool, *direction, &resolution, amount_in, slippage_bps)
                            .map_err(|error| failure(error, Some(&resolution)))
                    }
                    Err(error) => Err(failure(error, None)),
                }
            })
            .collect::<Vec<_>>();

        for rejected in candidates.iter().filter_map(|c| c.as_ref().err()) {
            debug!(
                pool = %rejected.pool_id,
                shard = rejected.shard,
                reason = %rejected.error,
                "Shard excluded from routing"
            );
        }

        let selection = select_best_route(candidates)?;
        let best = selection.best;
        let price = effective_price(
            amount_in,
            best.amount_out,
            input_token.decimals,
            output_token.decimals,
        );
        let quote = Quote {
            id: Uuid::new_v4(),
            amount_in,
            amount_out: best.amount_out,
            minimum_output: best.minimum_output,
            slippage_bps,
            price_impact_pct: best.price_impact_pct,
            price_impact_level: PriceImpactLevel::from_pct(best.price_impact_pct),
            effective_price: price,
            input_token,
            output_token,
            route: best,
            shards: selection.quotes,
            rejected: selection.rejected,
            computed_at: now,
        };

        info!(
            quote_id = %quote.id,
            pair = %format!("{}->{}", quote.input_token.symbol, quote.output_token.symbol),
            pool = %quote.route.pool_id,
            shard = quote.route.shard,
            provenance = %quote.provenance(),
            amount_in = %quote.amount_in,
            amount_out = %quote.amount_out,
            minimum_output = %quote.minimum_output,
            price_impact_pct = %quote.price_impact_pct,
            "Quote computed"
        );
        Ok(quote)
    }

    /// Resolve one pool, falling back to configuration if `deadline` passes first.
    ///
    /// The underlying fetch keeps running and still fills the cache.
    async fn resolve_within(
        &self,
        pool: &Pool,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<Resolution, QuoteError> {
        match tokio::time::timeout_at(deadline, self.resolver.resolve(pool, now)).await {
            Ok(resolution) => resolution,
            Err(_) => {
                warn!(
                    pool = %pool.id,
                    account = %pool.token_a_account,
                    error_kind = "quote_timeout",
                    deadline_ms = self.settings.deadline_ms,
                    "Reserve fetch missed the quote deadline, using static configuration"
                );
                let timeout = || QuoteError::QuoteTimeout {
                    pool_id: pool.id.clone(),
                };
                let snapshot = self.resolver.fallback(pool, now).map_err(|_| timeout())?;
                if !snapshot.has_liquidity() {
                    return Err(timeout());
                }
                Ok(Resolution {
                    snapshot,
                    fallback: Some(FallbackReason::DeadlineExceeded),
                })
            }
        }
    }

    /// One full refresh of every configured pool
    pub async fn refresh_pools(&self) -> RefreshOutcome {
        self.refresh_pools_at(Utc::now()).await
    }

    pub async fn refresh_pools_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        self.store.refresh_all(&self.resolver, self.catalog.pools(), now).await
    }

    pub async fn get_cached_pools(&self) -> AggregateState {
        self.store.snapshot(Utc::now()).await
    }

    pub async fn get_cached_pools_at(&self, now: DateTime<Utc>) -> AggregateState {
        self.store.snapshot(now).await
    }

    /// Current LP-token supply of a configured pool
    pub async fn lp_supply(&self, pool_id: &str) -> Result<TokenAmount, AppError> {
        let pool = self
            .catalog
            .pools()
            .iter()
            .find(|p| p.id == pool_id)
            .ok_or_else(|| AppError::ConfigError(format!("unknown pool {}", pool_id)))?;
        Ok(self.resolver.fetch_lp_supply(pool).await?)
    }

    /// Refresh every `interval` until the handle is aborted.
    ///
    /// A rate-limited refresh pauses the loop for a multiple of the interval
    /// that grows with consecutive failures.
    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "Starting pool refresh loop");

            loop {
                ticker.tick().await;
                match self.refresh_pools().await {
                    RefreshOutcome::Completed(report) if report.rate_limited() => {
                        let backoff = interval
                            * report.consecutive_failures.clamp(1, MAX_BACKOFF_INTERVALS);
                        warn!(
                            backoff_ms = backoff.as_millis() as u64,
                            consecutive_failures = report.consecutive_failures,
                            "RPC rate limited, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    RefreshOutcome::Completed(_) => {}
                    RefreshOutcome::InProgress => debug!("Previous refresh still running"),
                }
            }
        })
    }
}
