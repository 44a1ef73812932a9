//! Walk-through of a forum request path: rate limiting, cached reads,
//! write hooks and view counters.
//!
//! Run with: cargo run --example forum

use entity_cache::{
    backend::InMemoryBackend, error::Result, repository::InMemoryRepository, CacheConfig,
    CacheEntity, CacheService, Filter, LifecycleListener, RateLimitScope,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug)]
struct Topic {
    id: u64,
    user_id: u64,
    title: String,
    status: String,
}

impl CacheEntity for Topic {
    type Key = u64;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn entity_kind() -> &'static str {
        "topic"
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct User {
    id: u64,
    username: String,
}

impl CacheEntity for User {
    type Key = u64;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn entity_kind() -> &'static str {
        "user"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== entity-cache - Forum Example ===\n");

    let config = CacheConfig::from_env()?;
    let cache = CacheService::from_config(InMemoryBackend::new(), &config);

    let mut users = InMemoryRepository::new();
    users.insert(User {
        id: 1,
        username: "alice".to_string(),
    });
    users.insert(User {
        id: 2,
        username: "bob".to_string(),
    });

    let mut topics = InMemoryRepository::new();
    for (id, user_id, status) in [(10, 1, "open"), (11, 2, "open"), (12, 1, "closed")] {
        topics.insert(Topic {
            id,
            user_id,
            title: format!("Topic {}", id),
            status: status.to_string(),
        });
    }

    // 1. Budget check for an anonymous caller
    let scope = RateLimitScope::Ip("127.0.0.1".to_string());
    let budget = cache.limiter().check_scope(&scope).await?;
    println!(
        "1. {}: {} requests left, window closes in {}s\n",
        scope, budget.remaining, budget.retry_after
    );

    // 2. Topic list with authors, one batched lookup per kind
    let listed = cache
        .entities()
        .get_many::<Topic, _>(&topics, &[10, 11, 12])
        .await?;
    let author_ids: Vec<u64> = listed.iter().map(|t| t.user_id).collect();
    let authors = cache
        .entities()
        .get_dict::<User, _>(&users, &author_ids)
        .await?;
    println!("2. Topic list:");
    for topic in &listed {
        let author = authors
            .get(&topic.user_id.to_string())
            .map_or("?", |u| u.username.as_str());
        println!("   #{} {} by {} [{}]", topic.id, topic.title, author, topic.status);
    }

    // 3. Counts: the unfiltered one is kept in step by the hooks
    let open = Filter::new().with("status", "open");
    let total = cache
        .entities()
        .filter_count::<Topic, _>(&topics, &Filter::new())
        .await?;
    let open_count = cache
        .entities()
        .filter_count::<Topic, _>(&topics, &open)
        .await?;
    println!("\n3. {} topics, {} open", total, open_count);

    // 4. A new topic is committed
    let created = Topic {
        id: 13,
        user_id: 2,
        title: "Topic 13".to_string(),
        status: "open".to_string(),
    };
    topics.insert(created.clone());
    cache.hooks().on_create(&created).await;
    let total = cache
        .entities()
        .filter_count::<Topic, _>(&topics, &Filter::new())
        .await?;
    println!("4. After create: {} topics", total);

    // 5. View counters
    for _ in 0..3 {
        cache.stats().increase(&13, "views", 1).await?;
    }
    let stat = cache.stats().get(&13).await?;
    println!("5. Topic 13 views: {}\n", stat.get("views"));

    Ok(())
}
