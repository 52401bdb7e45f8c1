//! Resolves a pool's reserves: cache first, then the chain, then static config

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Pool;
use crate::infrastructure::blockchain::ChainReader;
use crate::infrastructure::cache::{FetchResult, ReserveCache};
use crate::shared::errors::{ChainError, QuoteError};
use crate::shared::types::{Provenance, ReserveSnapshot, TokenAmount};
use crate::shared::utils::to_base_units_truncated;

/// Why a resolution fell back to configuration data
#[derive(Debug, Clone)]
pub enum FallbackReason {
    Chain(ChainError),
    DeadlineExceeded,
}

impl FallbackReason {
    pub fn chain_error(&self) -> Option<&ChainError> {
        match self {
            FallbackReason::Chain(err) => Some(err),
            FallbackReason::DeadlineExceeded => None,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Chain(err) => write!(f, "{} ({})", err, err.kind()),
            FallbackReason::DeadlineExceeded => f.write_str("quote deadline exceeded"),
        }
    }
}

/// Reserve snapshot plus the reason it is not live, if it is not
#[derive(Debug, Clone)]
pub struct Resolution {
    pub snapshot: ReserveSnapshot,
    pub fallback: Option<FallbackReason>,
}

impl Resolution {
    pub fn provenance(&self) -> Provenance {
        self.snapshot.provenance
    }
}

/// Clears a pool's in-flight marker however the fetch task ends, panics included
struct InflightGuard {
    cache: Arc<ReserveCache>,
    pool_id: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.cache.finish(&self.pool_id);
    }
}

/// Combines the chain reader and the reserve cache for one pool at a time
pub struct PoolStateResolver {
    reader: Arc<dyn ChainReader>,
    cache: Arc<ReserveCache>,
}

impl PoolStateResolver {
    pub fn new(reader: Arc<dyn ChainReader>, cache: Arc<ReserveCache>) -> Self {
        Self { reader, cache }
    }

    pub fn cache(&self) -> &Arc<ReserveCache> {
        &self.cache
    }

    /// Live reserves when reachable, otherwise configuration reserves tagged
    /// `stale-fallback`. Only fails if the fallback itself cannot be built.
    pub async fn resolve(&self, pool: &Pool, now: DateTime<Utc>) -> Result<Resolution, QuoteError> {
        match self.fetch_live(pool, now).await {
            Ok(snapshot) => Ok(Resolution {
                snapshot,
                fallback: None,
            }),
            Err(err) => {
                warn!(
                    pool = %pool.id,
                    account = err.account(),
                    error_kind = %err.kind(),
                    error = %err,
                    "Reserve fetch failed, using static configuration"
                );
                let snapshot = self.fallback(pool, now)?;
                Ok(Resolution {
                    snapshot,
                    fallback: Some(FallbackReason::Chain(err)),
                })
            }
        }
    }

    /// Cached or freshly fetched live reserves. Concurrent callers for the
    /// same pool share one fetch; successful fetches are cached.
    pub async fn fetch_live(
        &self,
        pool: &Pool,
        now: DateTime<Utc>,
    ) -> Result<ReserveSnapshot, ChainError> {
        if let Some(snapshot) = self.cache.get(&pool.id, now) {
            return Ok(snapshot);
        }
        self.cache
            .coalesce(&pool.id, now, || self.start_fetch(pool, now))
            .await
    }

    /// Spawned so that abandoning a waiter never cancels the fetch itself
    fn start_fetch(&self, pool: &Pool, now: DateTime<Utc>) -> BoxFuture<'static, FetchResult> {
        let reader = Arc::clone(&self.reader);
        let cache = Arc::clone(&self.cache);
        let pool_id = pool.id.clone();
        let (account_a, account_b) = (pool.token_a_account, pool.token_b_account);

        debug!(pool = %pool_id, "Fetching reserves from chain");
        let handle = tokio::spawn(async move {
            let inflight = InflightGuard {
                cache: Arc::clone(&cache),
                pool_id: pool_id.clone(),
            };
            let result = tokio::try_join!(
                reader.fetch_token_account_balance(&account_a),
                reader.fetch_token_account_balance(&account_b),
            )
            .map(|(reserve_a, reserve_b)| ReserveSnapshot::live(reserve_a, reserve_b, now));

            if let Ok(snapshot) = &result {
                cache.put(&pool_id, snapshot.clone(), cache.ttl());
            }
            // only after the put, so a new miss cannot start a redundant fetch
            drop(inflight);
            result
        });

        let pool_id = pool.id.clone();
        async move {
            handle
                .await
                .unwrap_or_else(|join_err| Err(ChainError::transport(pool_id, join_err)))
        }
        .boxed()
    }

    /// Configuration liquidity converted to base units, never cached.
    ///
    /// Conversion is fixed-point and truncates toward zero.
    pub fn fallback(&self, pool: &Pool, now: DateTime<Utc>) -> Result<ReserveSnapshot, QuoteError> {
        let reserve_a = to_base_units_truncated(pool.fallback_liquidity_a, pool.token_a.decimals)?;
        let reserve_b = to_base_units_truncated(pool.fallback_liquidity_b, pool.token_b.decimals)?;
        Ok(ReserveSnapshot::stale(reserve_a, reserve_b, now))
    }

    /// Current LP-token supply, uncached
    pub async fn fetch_lp_supply(&self, pool: &Pool) -> Result<TokenAmount, ChainError> {
        self.reader.fetch_token_supply(&pool.lp_mint).await
    }
}
