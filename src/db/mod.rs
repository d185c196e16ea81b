pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use cache::{Cache, CacheKey, CacheStore, MemoryCacheStore};
pub use memory::InMemoryStore;
pub use postgres::{create_pool, PostgresStore};
pub use redis::{create_redis_client, RedisCacheStore};
pub use store::RecommendationStore;
