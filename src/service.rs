//! High-level cache service for web applications.
//!
//! Bundles the entity cache, its write hooks, the rate limiter and the stat
//! counters over one shared backend, behind a cheaply cloneable handle.

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::hooks::InvalidationHooks;
use crate::observability::CacheMetrics;
use crate::query::EntityCache;
use crate::ratelimit::RateLimiter;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use crate::stat::StatStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// High-level cache service for web applications.
///
/// Every component reads and writes through the same backend, and the hooks
/// share the entity cache's namespace and TTLs.
///
/// # Example
///
/// ```ignore
/// use entity_cache::{CacheService, backend::InMemoryBackend};
///
/// let cache = CacheService::new(InMemoryBackend::new());
///
/// // In your web service struct
/// pub struct TopicService {
///     cache: CacheService<InMemoryBackend>,
///     repo: Arc<TopicRepository>,
/// }
///
/// impl TopicService {
///     pub async fn show(&self, id: u64, ip: &str) -> Result<Topic> {
///         self.cache.limiter().check_scope(&RateLimitScope::Ip(ip.into())).await?;
///         self.cache.entities().get_or_not_found(&*self.repo, &id).await
///     }
/// }
/// ```
#[derive(Clone)]
pub struct CacheService<B: CacheBackend> {
    entities: Arc<EntityCache<B>>,
    limiter: RateLimiter<B>,
    stats: StatStore<B>,
}

impl<B: CacheBackend> CacheService<B> {
    /// Create a new cache service with the given backend and default settings.
    pub fn new(backend: B) -> Self {
        Self::from_config(backend, &CacheConfig::default())
    }

    pub fn from_config(backend: B, config: &CacheConfig) -> Self {
        Self::build(EntityCache::from_config(backend, config))
    }

    /// Create a new cache service with custom metrics.
    pub fn with_metrics(backend: B, metrics: Box<dyn CacheMetrics>) -> Self {
        Self::build(EntityCache::new(backend).with_metrics(metrics))
    }

    fn build(entities: EntityCache<B>) -> Self {
        let backend = entities.backend().clone();
        CacheService {
            limiter: RateLimiter::new(backend.clone()),
            stats: StatStore::new(backend),
            entities: Arc::new(entities),
        }
    }

    pub fn entities(&self) -> &EntityCache<B> {
        &self.entities
    }

    /// Write hooks matching [`entities`](Self::entities).
    pub fn hooks(&self) -> InvalidationHooks<B> {
        self.entities.hooks()
    }

    pub fn limiter(&self) -> &RateLimiter<B> {
        &self.limiter
    }

    pub fn stats(&self) -> &StatStore<B> {
        &self.stats
    }

    /// Memoize the result of `compute` under an explicit key.
    ///
    /// Whatever `compute` returns is cached for `ttl`, including empty
    /// values. Backend failures are logged and fall through to `compute`.
    ///
    /// ```ignore
    /// let body = cache
    ///     .cached("api:timeline:42", Duration::from_secs(600), || render(42))
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Only errors from `compute` are returned.
    pub async fn cached<V, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let backend = self.entities.backend();
        match backend.get(key).await {
            Ok(Some(bytes)) => match deserialize_from_cache::<V>(&bytes) {
                Ok(value) => {
                    trace!("Cached value HIT: {}", key);
                    return Ok(value);
                }
                Err(e) => warn!("Discarding unreadable cached value {}: {}", key, e),
            },
            Ok(None) => trace!("Cached value MISS: {}", key),
            Err(e) => warn!("Cache read failed for {}, computing: {}", key, e),
        }

        let value = compute().await?;
        match serialize_for_cache(&value) {
            Ok(bytes) => {
                if let Err(e) = backend.set(key, bytes, Some(ttl)).await {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Cannot cache value for {}: {}", key, e),
        }
        Ok(value)
    }
}
