//! Metrics hooks and per-operation TTLs.
//!
//! # Metrics
//!
//! Implement `CacheMetrics` to feed cache behaviour into your monitoring
//! system:
//!
//! ```ignore
//! use entity_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let cache = EntityCache::new(backend)
//! //     .with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! The default is `NoOpMetrics`. The trait's own default methods log through
//! the `log` crate instead, so an empty `impl CacheMetrics for X {}` gives
//! debug-level tracing for free.
//!
//! # TTLs
//!
//! Point lookups and the unfiltered count are kept in sync by the write
//! hooks, so they can live long. Filter lookups are never touched by the
//! hooks and must expire quickly:
//!
//! | Operation | Default |
//! |-----------|---------|
//! | `get` | 1 day |
//! | `count` | 1 day |
//! | `ff` (filter first) | 5 minutes |
//! | `fc` (filter count) | 5 minutes |

use crate::key::Operation;
use std::time::Duration;

pub const ONE_DAY: Duration = Duration::from_secs(86_400);
pub const FIVE_MINUTES: Duration = Duration::from_secs(300);

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a cache set operation.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Record a cache delete operation.
    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// Record a cache failure that was absorbed.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// TTL for each kind of cached lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    pub get: Duration,
    pub count: Duration,
    pub filter_first: Duration,
    pub filter_count: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy {
            get: ONE_DAY,
            count: ONE_DAY,
            filter_first: FIVE_MINUTES,
            filter_count: FIVE_MINUTES,
        }
    }
}

impl TtlPolicy {
    /// Get TTL for an operation.
    pub fn for_operation(&self, op: Operation) -> Duration {
        match op {
            Operation::Get => self.get,
            Operation::Count => self.count,
            Operation::FilterFirst => self.filter_first,
            Operation::FilterCount => self.filter_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key", Duration::from_secs(1));
        metrics.record_miss("key", Duration::from_secs(2));
        metrics.record_error("key", "boom");
    }

    #[test]
    fn test_ttl_policy_default() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.for_operation(Operation::Get), ONE_DAY);
        assert_eq!(policy.for_operation(Operation::Count), ONE_DAY);
        assert_eq!(policy.for_operation(Operation::FilterFirst), FIVE_MINUTES);
        assert_eq!(policy.for_operation(Operation::FilterCount), FIVE_MINUTES);
    }

    #[test]
    fn test_filter_ttls_are_shorter_than_point_ttls() {
        let policy = TtlPolicy::default();
        assert!(policy.filter_first < policy.get);
        assert!(policy.filter_count < policy.count);
    }

    #[test]
    fn test_ttl_policy_override() {
        let policy = TtlPolicy {
            filter_count: Duration::from_secs(60),
            ..TtlPolicy::default()
        };
        assert_eq!(
            policy.for_operation(Operation::FilterCount),
            Duration::from_secs(60)
        );
    }
}
