//! Error types for the cache layer.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache layer.
///
/// Only some of these ever reach callers of [`EntityCache`](crate::EntityCache):
/// backend failures are absorbed there and turned into cache misses, while
/// repository failures are handed back untouched.
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when converting an entity to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to an entity.
    ///
    /// Common causes:
    /// - Cache was corrupted during transport or storage
    /// - Invalid Postcard encoding
    /// - A counter key holding something other than a decimal integer
    ///
    /// **Recovery:** The entry is treated as a miss and overwritten.
    DeserializationError(String),

    /// Backend storage error (Redis, in-memory, etc).
    ///
    /// Common causes:
    /// - Redis connection lost
    /// - Network timeout
    /// - Backend protocol error
    ///
    /// **Recovery:** Fail open to the underlying store.
    BackendError(String),

    /// Underlying store error (database, etc).
    ///
    /// Raised by [`DataRepository`](crate::DataRepository) implementations
    /// and propagated verbatim to the caller.
    RepositoryError(String),

    /// Entity lookup came back empty where the caller asked for a hard failure.
    ///
    /// Only produced by the `*_or_not_found` helpers. Plain lookups return
    /// `None` instead.
    NotFound(String),

    /// Caller exceeded its rate-limit budget.
    ///
    /// Expected control flow, not a fault. `retry_after` is the number of
    /// seconds until the current window closes.
    RateLimitExceeded {
        /// Seconds until the window resets.
        retry_after: i64,
    },

    /// Configuration error during crate initialization.
    ///
    /// Common causes:
    /// - Invalid connection string
    /// - Unparseable TTL in the environment
    ConfigError(String),

    /// Operation not supported by this backend or repository.
    NotImplemented(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// Expected during deployments: the entry is treated as a miss and
    /// recomputed.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// True for [`Error::RateLimitExceeded`].
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimitExceeded { .. })
    }

    /// Seconds to wait before retrying, when the error carries a hint.
    pub fn retry_after(&self) -> Option<i64> {
        match self {
            Error::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
            Error::NotFound(what) => write!(f, "{} not found", what),
            Error::RateLimitExceeded { retry_after } => {
                write!(f, "Rate limit exceeded, retry in {}s", retry_after)
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::InvalidCacheEntry(msg) => {
                write!(f, "Invalid cache entry: {}", msg)
            }
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}
