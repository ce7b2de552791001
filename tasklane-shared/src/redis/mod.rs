/// Redis integration
///
/// Redis backs the search result cache when `REDIS_URL` is configured.
/// Without it the cache falls back to process memory.
pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
