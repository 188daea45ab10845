use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entity::OwnerId;
use crate::telemetry;

/// The fixed set of per-owner cached aggregates.
///
/// Invalidation enumerates this set, so adding a variant is all it takes
/// to bring a new aggregate under the invalidation contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AggregateKind {
    DashboardSummary,
    CurrentPeriodStats,
    PriorPeriodStats,
    DailyRevenueSeries,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 4] = [
        AggregateKind::DashboardSummary,
        AggregateKind::CurrentPeriodStats,
        AggregateKind::PriorPeriodStats,
        AggregateKind::DailyRevenueSeries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::DashboardSummary => "dashboard_summary",
            AggregateKind::CurrentPeriodStats => "current_period_stats",
            AggregateKind::PriorPeriodStats => "prior_period_stats",
            AggregateKind::DailyRevenueSeries => "daily_revenue_series",
        }
    }

    /// Cache key for one owner's copy of this aggregate.
    pub fn cache_key(&self, owner: OwnerId) -> String {
        format!("{}:{}", self.as_str(), owner)
    }
}

/// Cache backend errors.
///
/// Reads fail open (the caller computes directly) and invalidations are
/// best-effort, so this error never aborts a mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Trait for cache backends holding serialized aggregate values.
///
/// Keys are plain strings; values are stored as `serde_json::Value` so a
/// single backend can hold every aggregate shape.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Store a value for `ttl`, replacing any existing entry.
    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Remove an entry. Removing an absent key is a no-op, never an
    /// error.
    async fn forget(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone, Debug)]
struct CachedEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache backend.
///
/// Thread-safe via `tokio::sync::Mutex`; entries expire on read. Suitable
/// for single-process deployments and tests.
#[derive(Clone, Default, Debug)]
pub struct InMemoryCacheStore {
    inner: Arc<Mutex<HashMap<String, CachedEntry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.inner.lock().await;
        guard.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let mut guard = self.inner.lock().await;
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                guard.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().await;
        guard.insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().await;
        guard.remove(key);
        Ok(())
    }
}

/// Handle over a cache backend for owner-scoped dashboard aggregates.
///
/// Constructed once at startup and passed to whatever needs it; cloning
/// shares the backend. This is the only way the crate touches the cache,
/// so there is no ambient cache state to forget to invalidate.
#[derive(Clone)]
pub struct DashboardCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl DashboardCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()), CacheConfig::default())
    }

    /// Serve `kind` for `owner` from cache, or compute and store it.
    ///
    /// A hit within TTL returns the stored value without invoking
    /// `compute`. On miss or expiry, `compute` runs synchronously and its
    /// result is stored with the kind's configured TTL. Concurrent misses
    /// for the same key may each invoke `compute`; recomputation is
    /// idempotent so nothing guards against it. Cache backend failures
    /// fail open: the value is computed directly and the failure logged.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        owner: OwnerId,
        kind: AggregateKind,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = kind.cache_key(owner);

        match self.store.get(&key).await {
            Ok(Some(value)) => {
                // A value that no longer deserializes is treated as a miss.
                if let Ok(hit) = serde_json::from_value::<T>(value) {
                    telemetry::record_cache_hit(kind.as_str());
                    return Ok(hit);
                }
                warn!(
                    owner = %owner,
                    aggregate = kind.as_str(),
                    "cached aggregate failed to deserialize; recomputing"
                );
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    owner = %owner,
                    aggregate = kind.as_str(),
                    error = %err,
                    "cache read failed; computing directly"
                );
            }
        }

        telemetry::record_cache_miss(kind.as_str());
        let fresh = compute().await?;

        match serde_json::to_value(&fresh) {
            Ok(value) => {
                if let Err(err) = self.store.put(&key, value, self.config.ttl(kind)).await {
                    warn!(
                        owner = %owner,
                        aggregate = kind.as_str(),
                        error = %err,
                        "failed to store computed aggregate"
                    );
                }
            }
            Err(err) => {
                warn!(
                    owner = %owner,
                    aggregate = kind.as_str(),
                    error = %err,
                    "computed aggregate is not serializable; skipping cache"
                );
            }
        }

        Ok(fresh)
    }

    /// Drop every cached aggregate for `owner`.
    ///
    /// Removal is unconditional and idempotent. Backend failures are
    /// logged and swallowed: a missed invalidation degrades to serving a
    /// stale aggregate until its TTL elapses, which is preferable to
    /// failing the mutation that triggered it.
    pub async fn invalidate(&self, owner: OwnerId) {
        for kind in AggregateKind::ALL {
            match self.store.forget(&kind.cache_key(owner)).await {
                Ok(()) => telemetry::record_cache_invalidation(kind.as_str()),
                Err(err) => {
                    warn!(
                        owner = %owner,
                        aggregate = kind.as_str(),
                        error = %err,
                        "cache invalidation failed; entry may stay stale until its ttl"
                    );
                }
            }
        }
        debug!(owner = %owner, "dropped cached aggregates");
    }
}

impl std::fmt::Debug for DashboardCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_ttl_cache() -> DashboardCache {
        let config = CacheConfig {
            summary_ttl_seconds: 60,
            current_period_ttl_seconds: 60,
            prior_period_ttl_seconds: 60,
            daily_series_ttl_seconds: 60,
        };
        DashboardCache::new(Arc::new(InMemoryCacheStore::new()), config)
    }

    #[tokio::test]
    async fn hit_does_not_recompute() {
        let cache = short_ttl_cache();
        let owner = OwnerId(1);

        let v1: Result<u64, CacheError> = cache
            .get_or_compute(owner, AggregateKind::DashboardSummary, || async { Ok(41) })
            .await;
        assert_eq!(v1.unwrap(), 41);

        // Second read must serve the cached value, not the new closure.
        let v2: Result<u64, CacheError> = cache
            .get_or_compute(owner, AggregateKind::DashboardSummary, || async {
                panic!("compute must not run on a cache hit")
            })
            .await;
        assert_eq!(v2.unwrap(), 41);
    }

    #[tokio::test]
    async fn expired_entry_recomputes() {
        let store = InMemoryCacheStore::new();
        store
            .put(
                &AggregateKind::DashboardSummary.cache_key(OwnerId(1)),
                serde_json::json!(1),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
        let cache = DashboardCache::new(Arc::new(store), CacheConfig::default());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let v: Result<u64, CacheError> = cache
            .get_or_compute(OwnerId(1), AggregateKind::DashboardSummary, || async {
                Ok(2)
            })
            .await;
        assert_eq!(v.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute_of_every_kind() {
        let cache = short_ttl_cache();
        let owner = OwnerId(7);

        for kind in AggregateKind::ALL {
            let _: Result<u64, CacheError> = cache
                .get_or_compute(owner, kind, || async { Ok(1) })
                .await;
        }

        cache.invalidate(owner).await;

        for kind in AggregateKind::ALL {
            let v: Result<u64, CacheError> =
                cache.get_or_compute(owner, kind, || async { Ok(2) }).await;
            assert_eq!(v.unwrap(), 2, "{} should have recomputed", kind.as_str());
        }

        // Exactly once: the recomputed value is cached again.
        for kind in AggregateKind::ALL {
            let v: Result<u64, CacheError> = cache
                .get_or_compute(owner, kind, || async {
                    panic!("second read after recompute must hit the cache")
                })
                .await;
            assert_eq!(v.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn invalidate_is_scoped_to_one_owner() {
        let cache = short_ttl_cache();

        let _: Result<u64, CacheError> = cache
            .get_or_compute(OwnerId(1), AggregateKind::DashboardSummary, || async {
                Ok(10)
            })
            .await;
        let _: Result<u64, CacheError> = cache
            .get_or_compute(OwnerId(2), AggregateKind::DashboardSummary, || async {
                Ok(20)
            })
            .await;

        cache.invalidate(OwnerId(1)).await;

        let other: Result<u64, CacheError> = cache
            .get_or_compute(OwnerId(2), AggregateKind::DashboardSummary, || async {
                panic!("owner 2's entry must survive owner 1's invalidation")
            })
            .await;
        assert_eq!(other.unwrap(), 20);
    }

    #[tokio::test]
    async fn invalidating_empty_cache_is_a_noop() {
        let cache = short_ttl_cache();
        // Nothing cached for this owner; must not error or panic.
        cache.invalidate(OwnerId(99)).await;
        cache.invalidate(OwnerId(99)).await;
    }

    #[tokio::test]
    async fn corrupt_entry_counts_as_miss() {
        let store = InMemoryCacheStore::new();
        store
            .put(
                &AggregateKind::DashboardSummary.cache_key(OwnerId(1)),
                serde_json::json!("not a number"),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        let cache = DashboardCache::new(Arc::new(store), CacheConfig::default());

        let v: Result<u64, CacheError> = cache
            .get_or_compute(OwnerId(1), AggregateKind::DashboardSummary, || async {
                Ok(5)
            })
            .await;
        assert_eq!(v.unwrap(), 5);
    }

    #[tokio::test]
    async fn cache_keys_embed_owner_and_kind() {
        assert_eq!(
            AggregateKind::DashboardSummary.cache_key(OwnerId(12)),
            "dashboard_summary:12"
        );
        assert_eq!(
            AggregateKind::DailyRevenueSeries.cache_key(OwnerId(3)),
            "daily_revenue_series:3"
        );
    }
}
