//! Cache-aside entity lookups - the main entry point for reads.

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::hooks::InvalidationHooks;
use crate::key::{Filter, KeyNamer, Operation};
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::repository::DataRepository;
use crate::serialization::{decode_counter, encode_counter};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache-aside facade over a [`CacheBackend`] and a [`DataRepository`].
///
/// Every lookup consults the backend first, falls back to the repository on a
/// miss, and writes what it found back to the backend. Entities the
/// repository does not have are never cached.
///
/// Backend failures never reach the caller: a failed read is a miss and a
/// failed write is dropped, both logged and reported to the metrics sink.
/// Repository failures are returned unchanged.
///
/// # Example
///
/// ```ignore
/// use entity_cache::{EntityCache, backend::InMemoryBackend};
///
/// let cache = EntityCache::new(InMemoryBackend::new());
/// let topic: Option<Topic> = cache.get(&topic_repo, &42).await?;
/// let authors = cache.get_dict::<User, _>(&user_repo, &[1, 2, 3]).await?;
/// ```
pub struct EntityCache<B: CacheBackend> {
    backend: B,
    keys: KeyNamer,
    ttls: TtlPolicy,
    metrics: Arc<dyn CacheMetrics>,
}

impl<B: CacheBackend> EntityCache<B> {
    /// Create with the default namespace and TTLs.
    pub fn new(backend: B) -> Self {
        Self::from_config(backend, &CacheConfig::default())
    }

    pub fn from_config(backend: B, config: &CacheConfig) -> Self {
        EntityCache {
            backend,
            keys: KeyNamer::new(config.namespace.clone()),
            ttls: config.ttls,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    /// Set custom TTL policy.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttls = policy;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn keys(&self) -> &KeyNamer {
        &self.keys
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttls
    }

    /// Write hooks targeting exactly the keys this cache reads.
    pub fn hooks(&self) -> InvalidationHooks<B> {
        InvalidationHooks::new(self.backend.clone(), self.keys.clone(), self.ttls)
            .with_shared_metrics(Arc::clone(&self.metrics))
    }

    /// Point lookup by primary key.
    ///
    /// # Errors
    ///
    /// Only repository errors are returned.
    pub async fn get<T, R>(&self, repository: &R, id: &T::Key) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let timer = Instant::now();
        let key = self.keys.get_key::<T>(id);

        if let Some(entity) = self.read_entity::<T>(&key).await {
            self.metrics.record_hit(&key, timer.elapsed());
            return Ok(Some(entity));
        }
        self.metrics.record_miss(&key, timer.elapsed());

        match repository.fetch_by_id(id).await? {
            Some(entity) => {
                self.write_entity(&key, &entity, self.ttls.get).await;
                Ok(Some(entity))
            }
            None => {
                debug!("{} not in store, leaving uncached", key);
                Ok(None)
            }
        }
    }

    /// Like [`get`](Self::get), but absence is `Error::NotFound`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when the entity does not exist, or any repository error.
    pub async fn get_or_not_found<T, R>(&self, repository: &R, id: &T::Key) -> Result<T>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.get(repository, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} \"{}\"", T::entity_kind(), id)))
    }

    /// Batched point lookup.
    ///
    /// One backend read for all ids, then one repository fetch for the ids
    /// the cache did not have, then one backend write for what the repository
    /// returned. The result is keyed by the `Display` form of each id; ids
    /// found nowhere are absent from it.
    ///
    /// # Errors
    ///
    /// Only repository errors are returned.
    pub async fn get_dict<T, R>(&self, repository: &R, ids: &[T::Key]) -> Result<HashMap<String, T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let timer = Instant::now();

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<&T::Key> = ids.iter().filter(|id| seen.insert(id.to_string())).collect();
        let keys: Vec<String> = unique.iter().map(|id| self.keys.get_key::<T>(id)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        let cached = match self.backend.mget(&key_refs).await {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                let err = Error::BackendError(format!(
                    "MGET returned {} values for {} keys",
                    values.len(),
                    keys.len()
                ));
                self.absorb(&self.keys.prefix::<T>(Operation::Get), &err);
                vec![None; keys.len()]
            }
            Err(e) => {
                self.absorb(&self.keys.prefix::<T>(Operation::Get), &e);
                vec![None; keys.len()]
            }
        };

        let mut found = HashMap::with_capacity(unique.len());
        let mut missed: Vec<T::Key> = Vec::new();
        for ((id, key), value) in unique.iter().zip(&keys).zip(cached) {
            match value.and_then(|bytes| self.decode_entity::<T>(key, &bytes)) {
                Some(entity) => {
                    found.insert(id.to_string(), entity);
                }
                None => missed.push((*id).clone()),
            }
        }

        debug!(
            "get_dict {}: {} hit(s), {} miss(es) in {:?}",
            T::entity_kind(),
            found.len(),
            missed.len(),
            timer.elapsed()
        );
        if missed.is_empty() {
            return Ok(found);
        }

        let fetched = repository.fetch_by_ids(&missed).await?;
        let mut to_cache = Vec::with_capacity(fetched.len());
        for entity in fetched {
            let id = entity.cache_key();
            let key = self.keys.get_key::<T>(&id);
            match entity.serialize_for_cache() {
                Ok(bytes) => to_cache.push((key, bytes)),
                Err(e) => self.absorb(&key, &e),
            }
            found.insert(id.to_string(), entity);
        }
        self.write_many(to_cache, self.ttls.get).await;

        Ok(found)
    }

    /// Batched lookup in the order of `ids`, silently dropping ids that
    /// resolve to nothing.
    ///
    /// # Errors
    ///
    /// Only repository errors are returned.
    pub async fn get_many<T, R>(&self, repository: &R, ids: &[T::Key]) -> Result<Vec<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let found = self.get_dict(repository, ids).await?;
        Ok(ids
            .iter()
            .filter_map(|id| found.get(&id.to_string()).cloned())
            .collect())
    }

    /// Batched lookup aligned with `ids`: one slot per id, `None` where the
    /// id resolves to nothing.
    ///
    /// # Errors
    ///
    /// Only repository errors are returned.
    pub async fn get_many_aligned<T, R>(
        &self,
        repository: &R,
        ids: &[T::Key],
    ) -> Result<Vec<Option<T>>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let found = self.get_dict(repository, ids).await?;
        Ok(ids
            .iter()
            .map(|id| found.get(&id.to_string()).cloned())
            .collect())
    }

    /// First entity matching `filter`.
    ///
    /// Cached under the canonical filter with the short `filter_first` TTL.
    /// Write hooks do not touch these entries, so a result may be stale for
    /// up to that TTL.
    ///
    /// # Errors
    ///
    /// Only repository errors are returned.
    pub async fn filter_first<T, R>(&self, repository: &R, filter: &Filter) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let timer = Instant::now();
        let key = self.keys.filter_key::<T>(Operation::FilterFirst, filter);

        if let Some(entity) = self.read_entity::<T>(&key).await {
            self.metrics.record_hit(&key, timer.elapsed());
            return Ok(Some(entity));
        }
        self.metrics.record_miss(&key, timer.elapsed());

        match repository.fetch_first(filter).await? {
            Some(entity) => {
                self.write_entity(&key, &entity, self.ttls.filter_first)
                    .await;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Like [`filter_first`](Self::filter_first), but absence is `Error::NotFound`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when nothing matches, or any repository error.
    pub async fn first_or_not_found<T, R>(&self, repository: &R, filter: &Filter) -> Result<T>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.filter_first(repository, filter).await?.ok_or_else(|| {
            let mut values = filter.iter().map(|(_, v)| v);
            match (values.next(), values.next()) {
                (Some(value), None) => {
                    Error::NotFound(format!("{} \"{}\"", T::entity_kind(), value))
                }
                _ => Error::NotFound(T::entity_kind().to_string()),
            }
        })
    }

    /// Number of entities matching `filter`.
    ///
    /// An empty filter is the unfiltered count: it lives under the `count`
    /// key, which the write hooks adjust, with the long `count` TTL. Any other
    /// filter is cached with the short `filter_count` TTL and only refreshed
    /// by expiry.
    ///
    /// # Errors
    ///
    /// Only repository errors are returned.
    pub async fn filter_count<T, R>(&self, repository: &R, filter: &Filter) -> Result<u64>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let timer = Instant::now();
        let (key, ttl) = if filter.is_empty() {
            (self.keys.count_key::<T>(), self.ttls.count)
        } else {
            (
                self.keys.filter_key::<T>(Operation::FilterCount, filter),
                self.ttls.filter_count,
            )
        };

        if let Some(bytes) = self.read(&key).await {
            match decode_counter(&bytes) {
                Ok(total) if total >= 0 => {
                    self.metrics.record_hit(&key, timer.elapsed());
                    return Ok(total.unsigned_abs());
                }
                // hook drift can push a cached count below zero; recount
                Ok(total) => debug!("Cached count {} at {} is negative, recounting", total, key),
                Err(e) => self.absorb(&key, &e),
            }
        }
        self.metrics.record_miss(&key, timer.elapsed());

        let total = repository.count(filter).await?;
        let stored = i64::try_from(total).unwrap_or(i64::MAX);
        self.write(&key, encode_counter(stored), ttl).await;
        Ok(total)
    }

    // ------------------------------------------------------------------------
    // Fail-open backend access
    // ------------------------------------------------------------------------

    fn absorb(&self, key: &str, err: &Error) {
        warn!("Cache failure on {} absorbed: {}", key, err);
        self.metrics.record_error(key, &err.to_string());
    }

    async fn read(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.absorb(key, &e);
                None
            }
        }
    }

    fn decode_entity<T: CacheEntity>(&self, key: &str, bytes: &[u8]) -> Option<T> {
        match T::deserialize_from_cache(bytes) {
            Ok(entity) => Some(entity),
            Err(e) => {
                self.absorb(key, &e);
                None
            }
        }
    }

    async fn read_entity<T: CacheEntity>(&self, key: &str) -> Option<T> {
        let bytes = self.read(key).await?;
        self.decode_entity(key, &bytes)
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        let timer = Instant::now();
        match self.backend.set(key, bytes, Some(ttl)).await {
            Ok(()) => self.metrics.record_set(key, timer.elapsed()),
            Err(e) => self.absorb(key, &e),
        }
    }

    async fn write_entity<T: CacheEntity>(&self, key: &str, entity: &T, ttl: Duration) {
        match entity.serialize_for_cache() {
            Ok(bytes) => self.write(key, bytes, ttl).await,
            Err(e) => self.absorb(key, &e),
        }
    }

    async fn write_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) {
        if entries.is_empty() {
            return;
        }
        let timer = Instant::now();
        let label = entries
            .first()
            .map(|(key, _)| key.clone())
            .unwrap_or_default();
        let count = entries.len();
        match self.backend.mset(entries, Some(ttl)).await {
            Ok(()) => {
                debug!("Cached {} fetched entities", count);
                self.metrics.record_set(&label, timer.elapsed());
            }
            Err(e) => self.absorb(&label, &e),
        }
    }
}
