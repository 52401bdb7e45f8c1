//! Per-pool reserve cache with lazy expiry and in-flight fetch coalescing

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::trace;

use crate::shared::errors::ChainError;
use crate::shared::types::ReserveSnapshot;

/// Roughly one fetch per pool every five seconds under continuous polling
pub const DEFAULT_RESERVE_TTL_MS: i64 = 5_000;

/// Outcome of one live reserve fetch, shareable between every waiter
pub type FetchResult = Result<ReserveSnapshot, ChainError>;
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: ReserveSnapshot,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Keyed by pool id. Entries are never evicted, only ignored once expired.
pub struct ReserveCache {
    entries: DashMap<String, CacheEntry>,
    inflight: DashMap<String, SharedFetch>,
    ttl: chrono::Duration,
}

impl ReserveCache {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Cached snapshot, or `None` (miss) when absent or `now >= expires_at`
    pub fn get(&self, pool_id: &str, now: DateTime<Utc>) -> Option<ReserveSnapshot> {
        let hit = self
            .entries
            .get(pool_id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.snapshot.clone());
        trace!(pool = pool_id, hit = hit.is_some(), "Reserve cache lookup");
        hit
    }

    /// Store a snapshot that expires `ttl` after it was captured
    pub fn put(&self, pool_id: &str, snapshot: ReserveSnapshot, ttl: chrono::Duration) {
        let expires_at = snapshot.captured_at + ttl;
        self.entries
            .insert(pool_id.to_string(), CacheEntry { snapshot, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Join the fetch already running for `pool_id`, or start one with `start`.
    ///
    /// The fetch started by `start` must call [`ReserveCache::finish`] when done.
    pub fn coalesce<F>(&self, pool_id: &str, now: DateTime<Utc>, start: F) -> SharedFetch
    where
        F: FnOnce() -> BoxFuture<'static, FetchResult>,
    {
        match self.inflight.entry(pool_id.to_string()) {
            Entry::Occupied(running) => {
                trace!(pool = pool_id, "Joining in-flight reserve fetch");
                running.get().clone()
            }
            Entry::Vacant(slot) => {
                // A fetch may have completed between the caller's miss and here
                if let Some(snapshot) = self.get(pool_id, now) {
                    return future::ready(Ok(snapshot)).boxed().shared();
                }
                let fetch = start().shared();
                slot.insert(fetch.clone());
                fetch
            }
        }
    }

    /// Drop the in-flight marker so the next miss issues a new fetch
    pub fn finish(&self, pool_id: &str) {
        self.inflight.remove(pool_id);
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

impl Default for ReserveCache {
    fn default() -> Self {
        Self::new(chrono::Duration::milliseconds(DEFAULT_RESERVE_TTL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::Provenance;
    use chrono::TimeZone;

    fn snapshot_at(captured_at: DateTime<Utc>) -> ReserveSnapshot {
        ReserveSnapshot::live(1_000_000u64.into(), 500_000u64.into(), captured_at)
    }

    #[test]
    fn test_ttl_boundary() {
        let cache = ReserveCache::default();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        cache.put("pool", snapshot_at(t0), cache.ttl());

        assert_eq!(cache.get("pool", t0), Some(snapshot_at(t0)));
        assert_eq!(
            cache.get("pool", t0 + chrono::Duration::milliseconds(4_999)),
            Some(snapshot_at(t0))
        );
        assert_eq!(cache.get("pool", t0 + chrono::Duration::milliseconds(5_000)), None);
        assert_eq!(cache.get("pool", t0 + chrono::Duration::seconds(60)), None);
        // expiry is lazy: the entry is still stored
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_key_is_miss() {
        let cache = ReserveCache::default();
        assert!(cache.get("unknown", Utc::now()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites_and_keeps_provenance() {
        let cache = ReserveCache::default();
        let t0 = Utc::now();
        cache.put("pool", snapshot_at(t0), cache.ttl());
        let later = t0 + chrono::Duration::seconds(1);
        let newer = ReserveSnapshot::live(7u64.into(), 9u64.into(), later);
        cache.put("pool", newer.clone(), cache.ttl());

        let hit = cache.get("pool", t0 + chrono::Duration::seconds(2)).unwrap();
        assert_eq!(hit, newer);
        assert_eq!(hit.provenance, Provenance::Live);
    }

    #[tokio::test]
    async fn test_coalesce_joins_running_fetch() {
        let cache = ReserveCache::default();
        let now = Utc::now();
        let first = cache.coalesce("pool", now, || future::ready(Ok(snapshot_at(now))).boxed());
        let second = cache.coalesce("pool", now, || panic!("second fetch must not start"));

        assert_eq!(cache.inflight_count(), 1);
        assert_eq!(first.await.unwrap(), second.await.unwrap());

        cache.finish("pool");
        assert_eq!(cache.inflight_count(), 0);
    }
}
