//! In-process caches, reset on restart

mod reserve_cache;

pub use reserve_cache::{CacheEntry, FetchResult, ReserveCache, SharedFetch, DEFAULT_RESERVE_TTL_MS};
