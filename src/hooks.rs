//! Write-path cache maintenance.
//!
//! Call the matching listener method after a row is committed to the store.
//! Hooks only ever touch the `get` and `count` keys of the written entity's
//! kind. Filter results are left to expire on their own.
//!
//! | Event | Effect |
//! |-------|--------|
//! | create | increment the cached count, if one is cached |
//! | update | overwrite the cached entity |
//! | delete | drop the cached entity and the cached count |

use crate::backend::CacheBackend;
use crate::entity::CacheEntity;
use crate::error::Error;
use crate::key::KeyNamer;
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use std::sync::Arc;
use std::time::Instant;

/// Receiver of committed entity writes.
///
/// Methods return nothing: cache maintenance must never fail a write that
/// the store has already accepted.
#[allow(async_fn_in_trait)]
pub trait LifecycleListener<T: CacheEntity>: Send + Sync {
    async fn on_create(&self, entity: &T);
    async fn on_update(&self, entity: &T);
    async fn on_delete(&self, entity: &T);
}

/// Keeps `get` and `count` entries in step with store writes.
///
/// Obtain one from [`EntityCache::hooks`](crate::EntityCache::hooks) so the
/// keys and TTLs match the ones reads use.
#[derive(Clone)]
pub struct InvalidationHooks<B: CacheBackend> {
    backend: B,
    keys: KeyNamer,
    ttls: TtlPolicy,
    metrics: Arc<dyn CacheMetrics>,
}

impl<B: CacheBackend> InvalidationHooks<B> {
    pub fn new(backend: B, keys: KeyNamer, ttls: TtlPolicy) -> Self {
        InvalidationHooks {
            backend,
            keys,
            ttls,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.with_shared_metrics(Arc::from(metrics))
    }

    pub(crate) fn with_shared_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn report(&self, event: &str, key: &str, err: &Error) {
        error!("Cache maintenance after {} failed on {}: {}", event, key, err);
        self.metrics.record_error(key, &err.to_string());
    }
}

impl<B, T> LifecycleListener<T> for InvalidationHooks<B>
where
    B: CacheBackend,
    T: CacheEntity,
{
    async fn on_create(&self, _entity: &T) {
        let key = self.keys.count_key::<T>();
        match self.backend.incr(&key, 1).await {
            Ok(Some(total)) => debug!("Count {} bumped to {}", key, total),
            Ok(None) => debug!("No cached count at {}, nothing to bump", key),
            Err(e) => self.report("create", &key, &e),
        }
    }

    async fn on_update(&self, entity: &T) {
        let timer = Instant::now();
        let key = self.keys.get_key::<T>(&entity.cache_key());
        let bytes = match entity.serialize_for_cache() {
            Ok(bytes) => bytes,
            Err(e) => return self.report("update", &key, &e),
        };
        match self.backend.set(&key, bytes, Some(self.ttls.get)).await {
            Ok(()) => self.metrics.record_set(&key, timer.elapsed()),
            Err(e) => self.report("update", &key, &e),
        }
    }

    async fn on_delete(&self, entity: &T) {
        let timer = Instant::now();
        let get_key = self.keys.get_key::<T>(&entity.cache_key());
        let count_key = self.keys.count_key::<T>();
        match self.backend.mdelete(&[get_key.as_str(), count_key.as_str()]).await {
            Ok(()) => self.metrics.record_delete(&get_key, timer.elapsed()),
            Err(e) => self.report("delete", &get_key, &e),
        }
    }
}
