//! Cache backend implementations.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// Trait for the shared key/value store every cache component writes to.
///
/// **IMPORTANT:** All methods use `&self` instead of `&mut self` to allow concurrent access.
/// Backend implementations should use interior mutability (DashMap, a pool, or external storage).
///
/// Values are opaque bytes. Absence (`None`) must stay distinguishable from a
/// stored empty or zero value.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found in cache
    /// - `Ok(None)` - Cache miss (key not found or expired)
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store value in cache with optional TTL.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove value from cache.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if key exists in cache.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Bulk get, positionally aligned with `keys`.
    ///
    /// Default implementation calls `get()` for each key.
    /// Override for batch efficiency (e.g., Redis MGET).
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Bulk set, every entry with the same TTL.
    ///
    /// Default implementation calls `set()` for each entry.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn mset(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    /// Bulk delete operation.
    ///
    /// Default implementation calls `delete()` for each key.
    /// Override for batch efficiency (e.g., Redis DEL).
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Atomically add `delta` to an integer counter.
    ///
    /// The counter must have been written with
    /// [`encode_counter`](crate::serialization::encode_counter). An absent key
    /// stays absent and yields `Ok(None)`. The key's TTL is left unchanged.
    ///
    /// # Errors
    /// Returns `Err` if the stored value is not an integer or the backend fails
    async fn incr(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let _ = (key, delta);
        Err(Error::NotImplemented(
            "incr not implemented for this backend".to_string(),
        ))
    }

    /// Atomically add `delta` to one field of a counter hash, creating both
    /// the hash and the field as needed. Returns the new field value.
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if the backend fails
    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let _ = (key, field, delta);
        Err(Error::NotImplemented(
            "hincr not implemented for this backend".to_string(),
        ))
    }

    /// Overwrite one field of a counter hash.
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if the backend fails
    async fn hset(&self, key: &str, field: &str, value: i64) -> Result<()> {
        let _ = (key, field, value);
        Err(Error::NotImplemented(
            "hset not implemented for this backend".to_string(),
        ))
    }

    /// Read a whole counter hash. A missing hash reads as empty.
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if the backend fails
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, i64>> {
        let _ = key;
        Err(Error::NotImplemented(
            "hgetall not implemented for this backend".to_string(),
        ))
    }

    /// Read several counter hashes, positionally aligned with `keys`.
    ///
    /// Default implementation runs `hgetall()` for every key concurrently.
    /// Override with a pipeline where the backend has one.
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if the backend fails
    async fn hgetall_many(&self, keys: &[&str]) -> Result<Vec<HashMap<String, i64>>> {
        futures::future::try_join_all(keys.iter().map(|key| self.hgetall(key))).await
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Optional: Clear all cache (use with caution).
    ///
    /// # Errors
    /// Returns `Err` if operation is not implemented or fails
    async fn clear_all(&self) -> Result<()> {
        Err(Error::NotImplemented(
            "clear_all not implemented for this backend".to_string(),
        ))
    }
}
