//! Performance benchmarks for entity-cache
//!
//! This benchmark suite measures:
//! - InMemory backend operations (set, get, mget, incr)
//! - EntityCache lookups (hit, miss, batched, counted)
//! - Rate limiter consumption
//! - Envelope serialization across payload sizes
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use entity_cache::backend::{CacheBackend, InMemoryBackend};
use entity_cache::serialization::encode_counter;
use entity_cache::{CacheEntity, DataRepository, EntityCache, Filter, RateLimiter};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Benchmark Test Fixtures
// ============================================================================

/// Benchmark entity with configurable data size
#[derive(Clone, Serialize, Deserialize)]
struct BenchEntity {
    id: u64,
    data: Vec<u8>,
}

impl CacheEntity for BenchEntity {
    type Key = u64;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn entity_kind() -> &'static str {
        "bench"
    }
}

impl BenchEntity {
    fn new(id: u64, size: usize) -> Self {
        BenchEntity {
            id,
            data: vec![0u8; size],
        }
    }
}

/// Repository that fabricates every requested row
#[derive(Clone)]
struct BenchRepository {
    default_size: usize,
}

impl BenchRepository {
    fn new(default_size: usize) -> Self {
        BenchRepository { default_size }
    }
}

impl DataRepository<BenchEntity> for BenchRepository {
    async fn fetch_by_id(&self, id: &u64) -> entity_cache::Result<Option<BenchEntity>> {
        Ok(Some(BenchEntity::new(*id, self.default_size)))
    }

    async fn fetch_by_ids(&self, ids: &[u64]) -> entity_cache::Result<Vec<BenchEntity>> {
        Ok(ids
            .iter()
            .map(|id| BenchEntity::new(*id, self.default_size))
            .collect())
    }

    async fn count(&self, _filter: &Filter) -> entity_cache::Result<u64> {
        Ok(1_000)
    }
}

// ============================================================================
// Group 1: InMemory Backend Benchmarks
// ============================================================================

fn inmemory_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_backend");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for size in [100, 1_000, 10_000].iter() {
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("set", size), size, |b, &size| {
                let backend = InMemoryBackend::new();
                let value = vec![1u8; size];

                b.to_async(&rt).iter(|| async {
                    backend
                        .set(black_box("test_key"), black_box(value.clone()), None)
                        .await
                        .expect("Failed to set")
                });
            });

        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("get_hit", size), size, |b, &size| {
                let backend = InMemoryBackend::new();
                rt.block_on(async {
                    backend
                        .set("test_key", vec![1u8; size], None)
                        .await
                        .expect("Failed to set");
                });

                b.to_async(&rt)
                    .iter(|| async { backend.get(black_box("test_key")).await });
            });
    }

    group.bench_function("mget_20", |b| {
        let backend = InMemoryBackend::new();
        let keys: Vec<String> = (0..20).map(|i| format!("key:{}", i)).collect();
        rt.block_on(async {
            for key in keys.iter().step_by(2) {
                backend
                    .set(key, vec![1u8; 256], None)
                    .await
                    .expect("Failed to set");
            }
        });
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        b.to_async(&rt)
            .iter(|| async { backend.mget(black_box(&key_refs)).await });
    });

    group.bench_function("incr", |b| {
        let backend = InMemoryBackend::new();
        rt.block_on(async {
            backend
                .set("counter", encode_counter(0), None)
                .await
                .expect("Failed to set");
        });

        b.to_async(&rt)
            .iter(|| async { backend.incr(black_box("counter"), 1).await });
    });

    group.finish();
}

// ============================================================================
// Group 2: EntityCache Benchmarks
// ============================================================================

fn entity_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_cache");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for size in [100, 1_000, 10_000].iter() {
        // cache lookup + deserialization
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("get_hit", size), size, |b, &size| {
                let cache = EntityCache::new(InMemoryBackend::new());
                let repo = BenchRepository::new(size);
                rt.block_on(async {
                    cache
                        .get::<BenchEntity, _>(&repo, &1)
                        .await
                        .expect("Failed to populate cache");
                });

                b.to_async(&rt).iter(|| async {
                    cache
                        .get::<BenchEntity, _>(black_box(&repo), black_box(&1))
                        .await
                });
            });

        // cache lookup + store fetch + serialization + cache write
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("get_miss", size), size, |b, &size| {
                let cache = Arc::new(EntityCache::new(InMemoryBackend::new()));
                let repo = BenchRepository::new(size);
                let counter = Arc::new(AtomicU64::new(0));

                b.to_async(&rt).iter(|| {
                    let cache = cache.clone();
                    let repo = repo.clone();
                    let counter = counter.clone();
                    async move {
                        // unique id per iteration forces a miss
                        let id = counter.fetch_add(1, Ordering::Relaxed);
                        cache.get::<BenchEntity, _>(black_box(&repo), &id).await
                    }
                });
            });
    }

    // half the ids cached, half fetched in one batch
    group.bench_function("get_dict_50_half_warm", |b| {
        let cache = Arc::new(EntityCache::new(InMemoryBackend::new()));
        let repo = BenchRepository::new(256);
        let counter = Arc::new(AtomicU64::new(0));

        b.to_async(&rt).iter(|| {
            let cache = cache.clone();
            let repo = repo.clone();
            let counter = counter.clone();
            async move {
                let round = counter.fetch_add(1, Ordering::Relaxed) * 25;
                let ids: Vec<u64> = (round..round + 50).collect();
                cache.get_dict::<BenchEntity, _>(black_box(&repo), &ids).await
            }
        });
    });

    group.bench_function("filter_count_hit", |b| {
        let cache = EntityCache::new(InMemoryBackend::new());
        let repo = BenchRepository::new(0);
        let filter = Filter::new().with("status", "open").with("author_id", 3);
        rt.block_on(async {
            cache
                .filter_count::<BenchEntity, _>(&repo, &filter)
                .await
                .expect("Failed to populate cache");
        });

        b.to_async(&rt).iter(|| async {
            cache
                .filter_count::<BenchEntity, _>(black_box(&repo), black_box(&filter))
                .await
        });
    });

    group.finish();
}

// ============================================================================
// Group 3: Rate Limiter Benchmarks
// ============================================================================

fn ratelimit_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    // steady state: one prefix, mostly exhausted
    group.bench_function("consume_same_prefix", |b| {
        let limiter = RateLimiter::new(InMemoryBackend::new());

        b.to_async(&rt).iter(|| async {
            limiter
                .consume(black_box("limit:ip:127.0.0.1"), 600, 300)
                .await
        });
    });

    // window creation on every call
    group.bench_function("consume_fresh_prefix", |b| {
        let limiter = Arc::new(RateLimiter::new(InMemoryBackend::new()));
        let counter = Arc::new(AtomicU64::new(0));

        b.to_async(&rt).iter(|| {
            let limiter = limiter.clone();
            let counter = counter.clone();
            async move {
                let prefix = format!("limit:ip:{}", counter.fetch_add(1, Ordering::Relaxed));
                limiter.consume(black_box(&prefix), 600, 300).await
            }
        });
    });

    group.finish();
}

// ============================================================================
// Group 4: Serialization Benchmarks
// ============================================================================

fn serialization_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for size in [100, 1_000, 10_000, 100_000].iter() {
        let entity = BenchEntity::new(1, *size);

        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("serialize", size), &entity, |b, entity| {
                b.iter(|| entity.serialize_for_cache());
            });

        let serialized = entity.serialize_for_cache().unwrap();
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(
                BenchmarkId::new("deserialize", size),
                &serialized,
                |b, serialized| {
                    b.iter(|| BenchEntity::deserialize_from_cache(black_box(serialized)));
                },
            );
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(
    benches,
    inmemory_benchmarks,
    entity_cache_benchmarks,
    ratelimit_benchmarks,
    serialization_benchmarks
);
criterion_main!(benches);
