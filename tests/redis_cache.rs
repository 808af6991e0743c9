//! RedisCache against a live server. Skipped when Redis isn't reachable
//! unless QOREDB_TEST_REDIS_REQUIRED is set.

use std::sync::Arc;
use std::time::Duration;

use qore_drivers::{QueryExecutor, SqliteExecutor};
use qore_query::CompiledQuery;
use qoredb_shard::observability::Sensitive;
use qoredb_shard::{
    DistributedCache, EngineError, KeyAllocator, RedisCache, ShardConfig, ShardConnectionManager,
    ShardDefinition,
};
use uuid::Uuid;

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool_or_default(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn redis_test_required() -> bool {
    env_bool_or_default("QOREDB_TEST_REDIS_REQUIRED", false)
}

fn is_redis_unavailable(err: &EngineError) -> bool {
    match err {
        EngineError::ConnectionFailed { message } => {
            let lower = message.to_ascii_lowercase();
            lower.contains("connection refused")
                || lower.contains("no route to host")
                || lower.contains("timed out")
                || lower.contains("network is unreachable")
                || lower.contains("cannot assign requested address")
        }
        _ => false,
    }
}

/// Connects with a per-test prefix so runs don't see each other's keys.
async fn connect() -> Option<RedisCache> {
    let url = env_or_default("QOREDB_TEST_REDIS_URL", "redis://127.0.0.1:6379");
    let prefix = format!("qoredb-test:{}:", Uuid::new_v4());
    match RedisCache::connect(&Sensitive::new(url), prefix).await {
        Ok(cache) => Some(cache),
        Err(err) if !redis_test_required() && is_redis_unavailable(&err) => {
            eprintln!("Skipping Redis test: {err}");
            None
        }
        Err(err) => panic!("Redis connection failed: {err}"),
    }
}

#[tokio::test]
async fn redis_compare_operations() {
    let Some(cache) = connect().await else {
        return;
    };

    assert!(cache.add("counter", "placeholder", Some(Duration::from_secs(60))).await.unwrap());
    assert!(!cache.add("counter", "other", None).await.unwrap());
    assert_eq!(cache.inc("counter", 1).await.unwrap(), None);

    assert!(!cache.cas("counter", "wrong", "10").await.unwrap());
    assert!(cache.cas("counter", "placeholder", "10").await.unwrap());
    assert_eq!(cache.inc("counter", 5).await.unwrap(), Some(15));

    assert!(!cache.cad("counter", "10").await.unwrap());
    assert!(!cache.ncad("counter", "15").await.unwrap());
    assert!(cache.ncad("counter", "placeholder").await.unwrap());
    assert_eq!(cache.get("counter").await.unwrap(), None);

    assert!(cache.add("stale", "placeholder", None).await.unwrap());
    assert!(cache.cad("stale", "placeholder").await.unwrap());
    cache.delete("stale").await.unwrap();
}

#[tokio::test]
async fn redis_counter_expires() {
    let Some(cache) = connect().await else {
        return;
    };

    cache.add("ttl", "a", Some(Duration::from_secs(120))).await.unwrap();
    assert!(cache.cas("ttl", "a", "b").await.unwrap());
    cache.set_ttl("ttl", Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cache.get("ttl").await.unwrap(), None);
}

#[tokio::test]
async fn redis_backed_allocation() {
    let Some(cache) = connect().await else {
        return;
    };
    assert!(cache.capabilities().distributed);

    let executor = SqliteExecutor::connect("sqlite::memory:", 1).await.unwrap();
    executor
        .execute(&CompiledQuery {
            sql: "CREATE TABLE filecache (fileid INTEGER PRIMARY KEY, storage INTEGER)".into(),
            params: Vec::new(),
        })
        .await
        .unwrap();
    let shards = ShardConnectionManager::default();
    shards.insert("shard-0", Arc::new(executor)).await;
    let definition = ShardDefinition {
        table: "filecache".into(),
        primary_key: "fileid".into(),
        shard_key: "storage".into(),
        shards: vec![ShardConfig::new("shard-0")],
        key_floor: 0,
    };

    let allocator = KeyAllocator::new(Arc::new(cache), Arc::new(shards)).unwrap();
    let first = allocator.next_key(&definition).await.unwrap();
    let second = allocator.next_key(&definition).await.unwrap();
    assert_eq!(first, 1_001);
    assert_eq!(second, first + 1);
}
