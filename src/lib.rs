//! # entity-cache
//!
//! Cache-aside entity reads, write-path invalidation and fixed-window rate
//! limiting over one shared key/value store.
//!
//! ## Features
//!
//! - **Cache-aside lookups:** point, batched and filtered reads that fall back
//!   to your database on a miss and populate the cache on the way out
//! - **Fail-open:** a broken cache degrades to direct store reads, never to errors
//! - **Write hooks:** keep cached entities and counts in step with commits
//! - **Rate limiting:** per-caller request budgets with `retry_after` hints
//! - **Backend Agnostic:** in-memory and Redis backends, or bring your own
//! - **Database Agnostic:** implement [`DataRepository`] over SQLx, Diesel or anything else
//!
//! ## Quick Start
//!
//! ```ignore
//! use entity_cache::{
//!     CacheEntity, CacheService, Filter, LifecycleListener,
//!     backend::InMemoryBackend,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! // 1. Define your entity
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Topic {
//!     id: u64,
//!     title: String,
//!     status: String,
//! }
//!
//! // 2. Implement CacheEntity
//! impl CacheEntity for Topic {
//!     type Key = u64;
//!     fn cache_key(&self) -> Self::Key { self.id }
//!     fn entity_kind() -> &'static str { "topic" }
//! }
//!
//! // 3. Create the service (cheap to clone, share it across handlers)
//! let cache = CacheService::new(InMemoryBackend::new());
//!
//! // 4. Read through the cache
//! let topic = cache.entities().get::<Topic, _>(&repo, &42).await?;
//! let open = cache
//!     .entities()
//!     .filter_count::<Topic, _>(&repo, &Filter::new().with("status", "open"))
//!     .await?;
//!
//! // 5. Tell the cache about committed writes
//! repo.update(&topic).await?;
//! cache.hooks().on_update(&topic).await;
//! ```
//!
//! ## Keys
//!
//! Every key the entity cache touches has the form
//! `{namespace}:{op}:{kind}[|{version}]:{suffix}`, see [`KeyNamer`].

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod key;
pub mod observability;
pub mod query;
pub mod ratelimit;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod stat;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use config::CacheConfig;
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use hooks::{InvalidationHooks, LifecycleListener};
pub use key::{Filter, KeyNamer, Operation};
pub use observability::{CacheMetrics, TtlPolicy};
pub use query::EntityCache;
pub use ratelimit::{RateLimitResult, RateLimitScope, RateLimiter};
pub use repository::DataRepository;
pub use service::CacheService;
pub use stat::{StatRecord, StatStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
