use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::db::cache::CacheStore;
use crate::error::AppResult;

/// Creates a Redis client for caching, rate limiting and events
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Cache store backed by Redis.
///
/// Every command goes through the same multiplexed connection and is
/// awaited, so a `set` followed by a `del` of the same key lands in that
/// order.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn new(client: Client) -> AppResult<Self> {
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Redis cache connected");
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        // SET EX rejects a zero TTL
        let _: () = conn.set_ex(key, value, ttl_secs.max(1)).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::{Cache, CacheKey};
    use crate::models::FeatureType;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_write_is_visible_immediately() {
        let client = create_redis_client(&redis_url()).unwrap();
        let store = RedisCacheStore::new(client).await.unwrap();

        store.set("ai:test:direct-write", "value", 60).await.unwrap();
        assert_eq!(
            store.get("ai:test:direct-write").await.unwrap(),
            Some("value".to_string())
        );

        assert!(store.del("ai:test:direct-write").await.unwrap());
        assert!(!store.del("ai:test:direct-write").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_invalidation_right_after_write_sticks() {
        let client = create_redis_client(&redis_url()).unwrap();
        let cache = Cache::new(std::sync::Arc::new(RedisCacheStore::new(client).await.unwrap()), 60);

        let key = CacheKey::recommendation(FeatureType::Schedule, "redis-test-group");
        cache.set(&key, &"payload", 60).await.unwrap();
        assert_eq!(cache.invalidate_group("redis-test-group").await.unwrap(), 1);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(cache.get::<String>(&key).await.unwrap(), None);
    }
}
