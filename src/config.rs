//! Runtime configuration for the cache layer.

use crate::error::{Error, Result};
use crate::key::DEFAULT_NAMESPACE;
use crate::observability::TtlPolicy;
use std::time::Duration;

/// Environment variable overriding the key namespace.
pub const ENV_NAMESPACE: &str = "ENTITY_CACHE_NAMESPACE";
/// Environment variables overriding each TTL, in whole seconds.
pub const ENV_TTL_GET: &str = "ENTITY_CACHE_TTL_GET";
pub const ENV_TTL_COUNT: &str = "ENTITY_CACHE_TTL_COUNT";
pub const ENV_TTL_FILTER_FIRST: &str = "ENTITY_CACHE_TTL_FILTER_FIRST";
pub const ENV_TTL_FILTER_COUNT: &str = "ENTITY_CACHE_TTL_FILTER_COUNT";
/// Largest TTL accepted from the environment (one year).
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 3600;

/// Namespace and TTLs shared by entity lookups and write hooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub namespace: String,
    pub ttls: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttls: TtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Defaults, overridden by any `ENTITY_CACHE_*` variables that are set.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a TTL variable is not a whole number of
    /// seconds between 1 and [`MAX_TTL_SECONDS`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a TTL variable is not a whole number of
    /// seconds between 1 and [`MAX_TTL_SECONDS`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CacheConfig::default();

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            if namespace.is_empty() || namespace.contains(':') {
                return Err(Error::ConfigError(format!(
                    "{} must be non-empty and must not contain ':', got {:?}",
                    ENV_NAMESPACE, namespace
                )));
            }
            config.namespace = namespace;
        }

        let ttl = |name: &str, default: Duration| -> Result<Duration> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if (1..=MAX_TTL_SECONDS).contains(&secs) => {
                        Ok(Duration::from_secs(secs))
                    }
                    _ => Err(Error::ConfigError(format!(
                        "{} must be between 1 and {} seconds, got {:?}",
                        name, MAX_TTL_SECONDS, raw
                    ))),
                },
            }
        };

        config.ttls = TtlPolicy {
            get: ttl(ENV_TTL_GET, config.ttls.get)?,
            count: ttl(ENV_TTL_COUNT, config.ttls.count)?,
            filter_first: ttl(ENV_TTL_FILTER_FIRST, config.ttls.filter_first)?,
            filter_count: ttl(ENV_TTL_FILTER_COUNT, config.ttls.filter_count)?,
        };

        debug!(
            "Cache config: namespace={} ttls={:?}",
            config.namespace, config.ttls
        );
        Ok(config)
    }
}
