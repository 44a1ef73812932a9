//! Wire formats for everything written to the cache backend.
//!
//! Two formats share the backend:
//!
//! - **Entities** are Postcard payloads wrapped in a versioned envelope.
//! - **Counters** (cached counts, rate-limit state) are ASCII decimal
//!   integers, so that a backend's native increment (`INCRBY` on Redis) can
//!   operate on them in place.
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "ENTC"              u32                postcard::to_allocvec(T)
//! ```
//!
//! # Example
//!
//! ```rust
//! use entity_cache::serialization::{serialize_for_cache, deserialize_from_cache};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Topic {
//!     id: u64,
//!     title: String,
//! }
//!
//! # fn main() -> entity_cache::Result<()> {
//! let topic = Topic { id: 1, title: "Hello".to_string() };
//! let bytes = serialize_for_cache(&topic)?;
//! let decoded: Topic = deserialize_from_cache(&bytes)?;
//! assert_eq!(topic, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for entity entries.
pub const CACHE_MAGIC: [u8; 4] = *b"ENTC";

/// Current schema version.
///
/// Increment when a cached type changes shape (fields added, removed,
/// reordered or retyped). Old entries then fail validation and are refetched.
/// To retire the entries of a single entity kind, bump its
/// [`CacheEntity::cache_version`](crate::CacheEntity::cache_version) instead.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for entity entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"ENTC"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The actual cached data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value from cache storage with validation.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
/// - `Error::DeserializationError`: Corrupted Postcard payload
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        log::debug!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

/// Encode an integer counter as stored by the backend.
pub fn encode_counter(value: i64) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Decode an integer counter written by [`encode_counter`] or by a backend
/// increment.
///
/// # Errors
///
/// Returns `Error::DeserializationError` if the bytes are not a decimal integer.
pub fn decode_counter(bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            Error::DeserializationError(format!(
                "expected a decimal counter, got {} bytes",
                bytes.len()
            ))
        })
}
