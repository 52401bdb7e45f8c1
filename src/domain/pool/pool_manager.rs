//! Aggregate store of enriched pools with single-flight refresh

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Pool, PoolStateResolver, Resolution};
use crate::shared::errors::ChainErrorKind;
use crate::shared::types::{Provenance, ReserveSnapshot, TokenAmount};

/// Default age after which the whole store is flagged stale
pub const DEFAULT_STALENESS_THRESHOLD_SECS: i64 = 120;

/// One pool and its last known reserves
#[derive(Debug, Clone, Serialize)]
pub struct PoolEntry {
    pub pool: Pool,
    pub snapshot: ReserveSnapshot,
    /// Why the last refresh could not read this pool live
    pub last_error: Option<String>,
}

impl PoolEntry {
    pub fn provenance(&self) -> Provenance {
        self.snapshot.provenance
    }
}

/// Read-only view of the store
#[derive(Debug, Clone, Serialize)]
pub struct AggregateState {
    pub pools: Vec<PoolEntry>,
    pub stale: bool,
    pub consecutive_failures: u32,
    pub last_full_success: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub refreshing: bool,
}

#[derive(Debug, Clone)]
pub struct PoolRefreshFailure {
    pub pool_id: String,
    pub kind: Option<ChainErrorKind>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub succeeded: usize,
    pub failures: Vec<PoolRefreshFailure>,
    pub consecutive_failures: u32,
    pub stale: bool,
}

impl RefreshReport {
    /// Any pool hit an RPC rate limit; callers should back off
    pub fn rate_limited(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.kind == Some(ChainErrorKind::RateLimited))
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Another refresh was already running; nothing was done
    InProgress,
    Completed(RefreshReport),
}

#[derive(Debug, Default)]
struct StoreState {
    pools: Vec<PoolEntry>,
    consecutive_failures: u32,
    last_full_success: Option<DateTime<Utc>>,
    last_refresh: Option<DateTime<Utc>>,
    stale: bool,
}

/// Clears the refreshing flag even if the refresh future is dropped
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Holds the last known set of enriched pools
pub struct PoolManager {
    state: RwLock<StoreState>,
    refreshing: AtomicBool,
    staleness_threshold: chrono::Duration,
}

impl PoolManager {
    pub fn new(staleness_threshold: chrono::Duration) -> Self {
        Self {
            state: RwLock::new(StoreState {
                stale: true,
                ..StoreState::default()
            }),
            refreshing: AtomicBool::new(false),
            staleness_threshold,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Resolve every pool in parallel and fold the results into the store.
    ///
    /// Returns `InProgress` immediately if a refresh is already running.
    pub async fn refresh_all(
        &self,
        resolver: &PoolStateResolver,
        pools: &[Pool],
        now: DateTime<Utc>,
    ) -> RefreshOutcome {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in progress, skipping");
            return RefreshOutcome::InProgress;
        }
        let _guard = RefreshGuard(&self.refreshing);

        let results = join_all(pools.iter().map(|pool| resolver.resolve(pool, now))).await;

        let mut state = self.state.write().await;
        let mut previous: HashMap<String, PoolEntry> = std::mem::take(&mut state.pools)
            .into_iter()
            .map(|entry| (entry.pool.id.clone(), entry))
            .collect();

        let mut succeeded = 0;
        let mut failures = Vec::new();
        let mut entries = Vec::with_capacity(pools.len());

        for (pool, result) in pools.iter().zip(results) {
            let prior = previous.remove(&pool.id).map(|entry| entry.snapshot);
            let entry = match result {
                Ok(Resolution {
                    snapshot,
                    fallback: None,
                }) => {
                    succeeded += 1;
                    PoolEntry {
                        pool: pool.clone(),
                        snapshot,
                        last_error: None,
                    }
                }
                Ok(Resolution {
                    snapshot: fallback,
                    fallback: Some(reason),
                }) => {
                    failures.push(PoolRefreshFailure {
                        pool_id: pool.id.clone(),
                        kind: reason.chain_error().map(|e| e.kind()),
                        reason: reason.to_string(),
                    });
                    PoolEntry {
                        pool: pool.clone(),
                        snapshot: keep_previous(prior, fallback),
                        last_error: Some(reason.to_string()),
                    }
                }
                Err(err) => {
                    failures.push(PoolRefreshFailure {
                        pool_id: pool.id.clone(),
                        kind: None,
                        reason: err.to_string(),
                    });
                    let empty =
                        ReserveSnapshot::stale(TokenAmount::zero(), TokenAmount::zero(), now);
                    PoolEntry {
                        pool: pool.clone(),
                        snapshot: keep_previous(prior, empty),
                        last_error: Some(err.to_string()),
                    }
                }
            };
            entries.push(entry);
        }

        state.pools = entries;
        state.last_refresh = Some(now);
        if failures.is_empty() {
            state.last_full_success = Some(now);
        }
        if succeeded > 0 {
            state.consecutive_failures = 0;
        } else if !pools.is_empty() {
            state.consecutive_failures += 1;
        }
        state.stale = self.is_stale(state.last_full_success, now);

        let report = RefreshReport {
            succeeded,
            failures,
            consecutive_failures: state.consecutive_failures,
            stale: state.stale,
        };
        drop(state);

        if report.failures.is_empty() {
            info!(pools = report.succeeded, "Pool refresh complete");
        } else {
            warn!(
                succeeded = report.succeeded,
                failed = report.failures.len(),
                consecutive_failures = report.consecutive_failures,
                stale = report.stale,
                rate_limited = report.rate_limited(),
                "Pool refresh finished with failures"
            );
        }
        RefreshOutcome::Completed(report)
    }

    /// Current view, with staleness re-evaluated at `now`
    pub async fn snapshot(&self, now: DateTime<Utc>) -> AggregateState {
        let state = self.state.read().await;
        AggregateState {
            pools: state.pools.clone(),
            stale: state.stale || self.is_stale(state.last_full_success, now),
            consecutive_failures: state.consecutive_failures,
            last_full_success: state.last_full_success,
            last_refresh: state.last_refresh,
            refreshing: self.is_refreshing(),
        }
    }

    /// Never fully refreshed counts as stale
    fn is_stale(&self, last_full_success: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_full_success {
            Some(at) => now - at > self.staleness_threshold,
            None => true,
        }
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(chrono::Duration::seconds(DEFAULT_STALENESS_THRESHOLD_SECS))
    }
}

/// A failed pool keeps its last snapshot, re-tagged as stale
fn keep_previous(prior: Option<ReserveSnapshot>, fallback: ReserveSnapshot) -> ReserveSnapshot {
    prior
        .map(|snapshot| snapshot.with_provenance(Provenance::StaleFallback))
        .unwrap_or(fallback)
}
