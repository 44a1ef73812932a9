//! Fixed-window request budgets.
//!
//! Each budget lives under two keys derived from a caller prefix:
//! `{prefix}$c` holds the remaining count and `{prefix}$r` the unix time the
//! window closes. Both are created together with the window as TTL, so a
//! budget silently returns to fresh once its window has passed.
//!
//! The read-decrement-write sequence is not atomic. Concurrent callers can
//! overdraw a budget by a handful of requests; nobody is ever locked out past
//! the end of the window.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::serialization::{decode_counter, encode_counter};
use chrono::Utc;
use std::fmt;
use std::time::Duration;

/// Seconds assumed left in the window when only the counter key survives.
pub const FALLBACK_RETRY_AFTER: i64 = 5;
/// Remaining budget assumed when only the reset key survives.
pub const FALLBACK_REMAINING: i64 = 5;
/// Longest window a budget can span (one year). Longer requests are clamped.
pub const MAX_WINDOW_SECONDS: i64 = 365 * 24 * 3600;

/// Outcome of one [`RateLimiter::consume`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Requests left in the window after this one.
    pub remaining: i64,
    /// Seconds until the window closes.
    pub retry_after: i64,
    /// The budget was already spent; nothing was consumed.
    pub exceeded: bool,
}

impl RateLimitResult {
    /// `Err(Error::RateLimitExceeded)` if the budget was spent.
    ///
    /// # Errors
    /// Returns `Error::RateLimitExceeded` when `exceeded` is set.
    pub fn into_result(self) -> Result<Self> {
        if self.exceeded {
            Err(Error::RateLimitExceeded {
                retry_after: self.retry_after,
            })
        } else {
            Ok(self)
        }
    }
}

/// Budget of `limit` requests per `window` seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: u64,
}

/// Caller identities requests are limited on, most specific first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Browser session id.
    Session(String),
    /// Bearer token.
    Token(String),
    /// Registered API client id.
    Client(String),
    /// Remote address, for anonymous traffic.
    Ip(String),
}

impl RateLimitScope {
    /// Key prefix of this caller's budget.
    pub fn prefix(&self) -> String {
        self.to_string()
    }

    pub fn default_quota(&self) -> Quota {
        match self {
            RateLimitScope::Session(_) => Quota {
                limit: 600,
                window: 300,
            },
            RateLimitScope::Token(_) | RateLimitScope::Client(_) => Quota {
                limit: 600,
                window: 600,
            },
            RateLimitScope::Ip(_) => Quota {
                limit: 3600,
                window: 3600,
            },
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitScope::Session(id) => write!(f, "limit:sid:{}", id),
            RateLimitScope::Token(token) => write!(f, "limit:tok:{}", token),
            RateLimitScope::Client(id) => write!(f, "limit:client:{}", id),
            RateLimitScope::Ip(addr) => write!(f, "limit:ip:{}", addr),
        }
    }
}

/// Fixed-window limiter over a shared [`CacheBackend`].
///
/// Backend failures fail open: the request is let through as though its
/// window had just started.
///
/// ```ignore
/// let limiter = RateLimiter::new(backend);
/// let budget = limiter.check("limit:login:127.0.0.1", 60, 3600).await?;
/// response.header("X-Rate-Remaining", budget.remaining);
/// ```
#[derive(Clone)]
pub struct RateLimiter<B: CacheBackend> {
    backend: B,
}

impl<B: CacheBackend> RateLimiter<B> {
    pub fn new(backend: B) -> Self {
        RateLimiter { backend }
    }

    /// Spend one request from the budget at `prefix`.
    pub async fn consume(&self, prefix: &str, limit: u32, window_seconds: u64) -> RateLimitResult {
        info!("Rate limit on {}", prefix);
        let window = i64::try_from(window_seconds)
            .unwrap_or(MAX_WINDOW_SECONDS)
            .clamp(1, MAX_WINDOW_SECONDS);
        let limit = i64::from(limit);
        let count_key = format!("{}$c", prefix);
        let reset_key = format!("{}$r", prefix);
        let now = Utc::now().timestamp();

        let values = match self
            .backend
            .mget(&[count_key.as_str(), reset_key.as_str()])
            .await
        {
            Ok(values) => values,
            Err(e) => {
                warn!("Rate limiter backend failed on {}, allowing: {}", prefix, e);
                return RateLimitResult {
                    remaining: limit - 1,
                    retry_after: window,
                    exceeded: false,
                };
            }
        };
        let mut values = values.into_iter();
        let counter = self.decode(&count_key, values.next().flatten());
        let reset_at = self.decode(&reset_key, values.next().flatten());

        if counter.is_none() && reset_at.is_none() {
            let remaining = limit - 1;
            let entries = vec![
                (count_key, encode_counter(remaining)),
                (reset_key, encode_counter(now.saturating_add(window))),
            ];
            if let Err(e) = self
                .backend
                .mset(entries, Some(Duration::from_secs(window.unsigned_abs())))
                .await
            {
                warn!("Failed to open rate limit window {}: {}", prefix, e);
            }
            return RateLimitResult {
                remaining,
                retry_after: window,
                exceeded: false,
            };
        }

        let retry_after = reset_at.map_or(FALLBACK_RETRY_AFTER, |reset_at| {
            reset_at.saturating_sub(now)
        });
        let counter = counter.unwrap_or(FALLBACK_REMAINING);

        if counter <= 0 && retry_after > 0 {
            debug!("Rate limit exceeded on {}, retry in {}s", prefix, retry_after);
            return RateLimitResult {
                remaining: counter,
                retry_after,
                exceeded: true,
            };
        }

        let remaining = counter.saturating_sub(1);
        if retry_after > 0 {
            let ttl = retry_after.min(MAX_WINDOW_SECONDS).unsigned_abs();
            let ttl = Duration::from_secs(ttl);
            if let Err(e) = self
                .backend
                .set(&count_key, encode_counter(remaining), Some(ttl))
                .await
            {
                warn!("Failed to record rate limit hit on {}: {}", prefix, e);
            }
        }
        RateLimitResult {
            remaining,
            retry_after,
            exceeded: false,
        }
    }

    /// [`consume`](Self::consume), turning a spent budget into an error.
    ///
    /// # Errors
    /// Returns `Error::RateLimitExceeded` when the budget is spent.
    pub async fn check(&self, prefix: &str, limit: u32, window_seconds: u64) -> Result<RateLimitResult> {
        self.consume(prefix, limit, window_seconds)
            .await
            .into_result()
    }

    /// Spend one request from a scope's budget with its default quota.
    pub async fn consume_scope(&self, scope: &RateLimitScope) -> RateLimitResult {
        let quota = scope.default_quota();
        self.consume(&scope.prefix(), quota.limit, quota.window)
            .await
    }

    /// [`consume_scope`](Self::consume_scope), turning a spent budget into an error.
    ///
    /// # Errors
    /// Returns `Error::RateLimitExceeded` when the budget is spent.
    pub async fn check_scope(&self, scope: &RateLimitScope) -> Result<RateLimitResult> {
        self.consume_scope(scope).await.into_result()
    }

    fn decode(&self, key: &str, raw: Option<Vec<u8>>) -> Option<i64> {
        let bytes = raw?;
        match decode_counter(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable rate limit key {}: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn limiter() -> (InMemoryBackend, RateLimiter<InMemoryBackend>) {
        let backend = InMemoryBackend::new();
        (backend.clone(), RateLimiter::new(backend))
    }

    #[tokio::test]
    async fn test_fresh_window() {
        let (backend, limiter) = limiter();

        let result = limiter.consume("ip:1.2.3.4", 2, 5).await;
        assert_eq!(
            result,
            RateLimitResult {
                remaining: 1,
                retry_after: 5,
                exceeded: false
            }
        );
        assert!(backend.exists("ip:1.2.3.4$c").await.unwrap());
        assert!(backend.exists("ip:1.2.3.4$r").await.unwrap());
    }

    #[tokio::test]
    async fn test_budget_runs_out() {
        let (_, limiter) = limiter();

        limiter.consume("ip:1.2.3.4", 2, 5).await;

        let second = limiter.consume("ip:1.2.3.4", 2, 5).await;
        assert_eq!(second.remaining, 0);
        assert!(second.retry_after <= 5);
        assert!(!second.exceeded);

        let third = limiter.consume("ip:1.2.3.4", 2, 5).await;
        assert_eq!(third.remaining, 0);
        assert!(third.retry_after > 0 && third.retry_after <= 5);
        assert!(third.exceeded);
    }

    #[tokio::test]
    async fn test_three_per_ten_seconds() {
        let (_, limiter) = limiter();

        let remaining: Vec<i64> = [
            limiter.consume("ip:10.0.0.1", 3, 10).await,
            limiter.consume("ip:10.0.0.1", 3, 10).await,
            limiter.consume("ip:10.0.0.1", 3, 10).await,
        ]
        .iter()
        .inspect(|result| assert!(!result.exceeded))
        .map(|result| result.remaining)
        .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let fourth = limiter.consume("ip:10.0.0.1", 3, 10).await;
        assert!(fourth.exceeded);
        assert!(fourth.retry_after > 0 && fourth.retry_after <= 10);
        assert!(matches!(
            fourth.into_result(),
            Err(Error::RateLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_huge_window_is_clamped() {
        let (backend, limiter) = limiter();

        let first = limiter.consume("p", 10, u64::MAX).await;
        assert_eq!(first.remaining, 9);
        assert_eq!(first.retry_after, MAX_WINDOW_SECONDS);

        let second = limiter.consume("p", 10, u64::MAX).await;
        assert_eq!(second.remaining, 8);
        assert!(second.retry_after <= MAX_WINDOW_SECONDS);
        assert!(backend.exists("p$c").await.unwrap());
    }

    #[tokio::test]
    async fn test_extreme_stored_values_do_not_overflow() {
        let (backend, limiter) = limiter();
        backend
            .mset(
                vec![
                    ("x$c".to_string(), encode_counter(i64::MIN)),
                    ("x$r".to_string(), encode_counter(i64::MIN)),
                ],
                None,
            )
            .await
            .unwrap();
        backend
            .mset(
                vec![
                    ("y$c".to_string(), encode_counter(5)),
                    ("y$r".to_string(), encode_counter(i64::MAX)),
                ],
                None,
            )
            .await
            .unwrap();

        let past = limiter.consume("x", 10, 60).await;
        assert!(!past.exceeded);
        assert_eq!(past.remaining, i64::MIN);

        let future = limiter.consume("y", 10, 60).await;
        assert!(!future.exceeded);
        assert_eq!(future.remaining, 4);
    }

    #[tokio::test]
    async fn test_exceeded_does_not_mutate() {
        let (backend, limiter) = limiter();

        limiter.consume("tok:abc", 1, 60).await;
        limiter.consume("tok:abc", 1, 60).await;
        limiter.consume("tok:abc", 1, 60).await;

        let raw = backend.get("tok:abc$c").await.unwrap().unwrap();
        assert_eq!(decode_counter(&raw).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let (_, limiter) = limiter();

        limiter.consume("sid:1", 1, 2).await;
        assert!(limiter.consume("sid:1", 1, 2).await.exceeded);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let fresh = limiter.consume("sid:1", 1, 2).await;
        assert!(!fresh.exceeded);
        assert_eq!(fresh.remaining, 0);
        assert_eq!(fresh.retry_after, 2);
    }

    #[tokio::test]
    async fn test_missing_reset_key_falls_back() {
        let (backend, limiter) = limiter();
        backend
            .set("p$c", encode_counter(3), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let result = limiter.consume("p", 10, 60).await;
        assert_eq!(result.remaining, 2);
        assert_eq!(result.retry_after, FALLBACK_RETRY_AFTER);
        assert!(!result.exceeded);
    }

    #[tokio::test]
    async fn test_missing_counter_key_falls_back() {
        let (backend, limiter) = limiter();
        let reset_at = Utc::now().timestamp() + 60;
        backend
            .set("p$r", encode_counter(reset_at), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let result = limiter.consume("p", 10, 60).await;
        assert_eq!(result.remaining, FALLBACK_REMAINING - 1);
        assert!(!result.exceeded);
    }

    #[tokio::test]
    async fn test_stale_reset_time_does_not_block() {
        let (backend, limiter) = limiter();
        let past = Utc::now().timestamp() - 10;
        backend
            .mset(
                vec![
                    ("p$c".to_string(), encode_counter(0)),
                    ("p$r".to_string(), encode_counter(past)),
                ],
                Some(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        let result = limiter.consume("p", 10, 60).await;
        assert!(!result.exceeded);
        assert!(result.retry_after <= 0);
        assert_eq!(result.remaining, -1);

        // nothing written back for a closed window
        let raw = backend.get("p$c").await.unwrap().unwrap();
        assert_eq!(decode_counter(&raw).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_returns_error() {
        let (_, limiter) = limiter();

        assert!(limiter.check("login:alice", 1, 60).await.is_ok());
        let err = limiter.check("login:alice", 1, 60).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.retry_after().unwrap() > 0);
        assert!(err.to_string().starts_with("Rate limit exceeded, retry in "));
    }

    #[test]
    fn test_scope_prefixes_and_quotas() {
        let session = RateLimitScope::Session("s1".to_string());
        assert_eq!(session.prefix(), "limit:sid:s1");
        assert_eq!(
            session.default_quota(),
            Quota {
                limit: 600,
                window: 300
            }
        );

        assert_eq!(
            RateLimitScope::Token("t".to_string()).prefix(),
            "limit:tok:t"
        );
        assert_eq!(
            RateLimitScope::Client("7".to_string()).default_quota().window,
            600
        );

        let ip = RateLimitScope::Ip("10.0.0.1".to_string());
        assert_eq!(ip.prefix(), "limit:ip:10.0.0.1");
        assert_eq!(ip.default_quota().limit, 3600);
    }

    #[tokio::test]
    async fn test_consume_scope() {
        let (backend, limiter) = limiter();
        let scope = RateLimitScope::Client("42".to_string());

        let result = limiter.check_scope(&scope).await.unwrap();
        assert_eq!(result.remaining, 599);
        assert_eq!(result.retry_after, 600);
        assert!(backend.exists("limit:client:42$c").await.unwrap());
    }

    #[tokio::test]
    async fn test_prefixes_are_independent() {
        let (_, limiter) = limiter();

        limiter.consume("a", 1, 60).await;
        assert!(limiter.consume("a", 1, 60).await.exceeded);
        assert!(!limiter.consume("b", 1, 60).await.exceeded);
    }
}
