//! Core entity trait that all cached entities must implement.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;

/// Trait that all entities stored in cache must implement.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use entity_cache::CacheEntity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Topic {
///     pub id: u64,
///     pub title: String,
/// }
///
/// impl CacheEntity for Topic {
///     type Key = u64;
///
///     fn cache_key(&self) -> Self::Key {
///         self.id
///     }
///
///     fn entity_kind() -> &'static str {
///         "topic"
///     }
/// }
/// ```
pub trait CacheEntity: Send + Sync + Serialize + DeserializeOwned + Clone {
    /// Type of the entity's primary key.
    ///
    /// Its `Display` form is the identifier used in cache keys and in the
    /// mappings returned by batched lookups.
    type Key: Display + Clone + Send + Sync + Eq + Hash + 'static;

    /// Return the entity's primary key.
    fn cache_key(&self) -> Self::Key;

    /// Backend table (or collection) name for this entity type.
    ///
    /// Must not contain `:` or `|`, which delimit key segments.
    fn entity_kind() -> &'static str;

    /// Optional version tag mixed into every key of this entity type.
    ///
    /// Changing it moves the whole entity kind to a fresh key space, which
    /// retires every previously cached entry without enumerating them.
    /// Separator characters are escaped, so any string is a safe tag.
    fn cache_version() -> Option<&'static str> {
        None
    }

    /// Serialize entity for cache storage.
    ///
    /// See `crate::serialization` for the envelope format.
    fn serialize_for_cache(&self) -> Result<Vec<u8>> {
        crate::serialization::serialize_for_cache(self)
    }

    /// Deserialize entity from cache storage.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCacheEntry`: Bad magic or corrupted envelope
    /// - `Error::VersionMismatch`: Schema version changed
    /// - `Error::DeserializationError`: Corrupted payload
    fn deserialize_from_cache(bytes: &[u8]) -> Result<Self> {
        crate::serialization::deserialize_from_cache(bytes)
    }
}
