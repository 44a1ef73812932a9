//! Integer counters kept in backend hashes.
//!
//! Unlike everything else in this crate, a stat hash is not a copy of some
//! other store: the backend is where these numbers live. Errors therefore
//! propagate instead of failing open.

use crate::backend::CacheBackend;
use crate::error::Result;
use std::collections::HashMap;
use std::fmt::Display;

/// Default key prefix; records live at `{prefix}:{id}`.
pub const DEFAULT_STAT_PREFIX: &str = "stat";

/// Snapshot of one stat hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatRecord {
    fields: HashMap<String, i64>,
}

impl StatRecord {
    pub fn new(fields: HashMap<String, i64>) -> Self {
        StatRecord { fields }
    }

    /// Value of `field`, `0` if never written.
    pub fn get(&self, field: &str) -> i64 {
        self.fields.get(field).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &HashMap<String, i64> {
        &self.fields
    }
}

/// Per-entity counters such as views, likes or flags.
///
/// ```ignore
/// let stats = StatStore::new(backend).with_prefix("topic_stat");
/// stats.increase(&topic.id, "views", 1).await?;
/// let views = stats.get(&topic.id).await?.get("views");
/// ```
#[derive(Clone)]
pub struct StatStore<B: CacheBackend> {
    backend: B,
    prefix: String,
}

impl<B: CacheBackend> StatStore<B> {
    pub fn new(backend: B) -> Self {
        StatStore {
            backend,
            prefix: DEFAULT_STAT_PREFIX.to_string(),
        }
    }

    /// Use a different key prefix, e.g. one per entity kind.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn key(&self, id: &impl Display) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Atomically add `step` to one field, returning the new value.
    ///
    /// # Errors
    /// Returns `Err` if the backend fails or does not support hashes.
    pub async fn increase(&self, id: &impl Display, field: &str, step: i64) -> Result<i64> {
        let key = self.key(id);
        let value = self.backend.hincr(&key, field, step).await?;
        trace!("{}[{}] += {} -> {}", key, field, step, value);
        Ok(value)
    }

    /// Overwrite one field.
    ///
    /// # Errors
    /// Returns `Err` if the backend fails or does not support hashes.
    pub async fn set(&self, id: &impl Display, field: &str, value: i64) -> Result<()> {
        self.backend.hset(&self.key(id), field, value).await
    }

    /// # Errors
    /// Returns `Err` if the backend fails or does not support hashes.
    pub async fn get(&self, id: &impl Display) -> Result<StatRecord> {
        let fields = self.backend.hgetall(&self.key(id)).await?;
        Ok(StatRecord::new(fields))
    }

    /// Records for `ids` in order, fetched in one batch.
    ///
    /// # Errors
    /// Returns `Err` if the backend fails or does not support hashes.
    pub async fn get_many<K: Display>(&self, ids: &[K]) -> Result<Vec<StatRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let hashes = self.backend.hgetall_many(&key_refs).await?;
        Ok(hashes.into_iter().map(StatRecord::new).collect())
    }

    /// Like [`get_many`](Self::get_many), keyed by the `Display` form of each id.
    ///
    /// # Errors
    /// Returns `Err` if the backend fails or does not support hashes.
    pub async fn get_dict<K: Display>(&self, ids: &[K]) -> Result<HashMap<String, StatRecord>> {
        let records = self.get_many(ids).await?;
        Ok(ids
            .iter()
            .map(ToString::to_string)
            .zip(records)
            .collect())
    }
}
