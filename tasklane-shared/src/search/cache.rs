//! Search result cache
//!
//! Cached pages are keyed by organization, the organization's current index
//! generation and the request fingerprint. Any index write bumps the
//! generation, which orphans every older entry of that organization; stale
//! entries simply expire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::redis::{RedisClient, RedisClientError};

/// Default lifetime of a cached result page
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Entries kept by the in-memory cache before expired ones are swept
const MEMORY_SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis: {0}")]
    Redis(#[from] RedisClientError),
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    generations: RwLock<HashMap<Uuid, u64>>,
}

#[derive(Clone)]
enum Backend {
    Redis(RedisClient),
    Memory(Arc<MemoryCache>),
}

#[derive(Clone)]
pub struct SearchCache {
    backend: Backend,
    ttl: Duration,
}

fn generation_key(organization_id: Uuid) -> String {
    format!("tasklane:search:gen:{}", organization_id)
}

/// Cache key of one result page
pub fn result_key(organization_id: Uuid, generation: u64, fingerprint: &str) -> String {
    format!(
        "tasklane:search:{}:{}:{}",
        organization_id, generation, fingerprint
    )
}

impl SearchCache {
    pub fn redis(client: RedisClient, ttl: Duration) -> Self {
        Self {
            backend: Backend::Redis(client),
            ttl,
        }
    }

    pub fn memory(ttl: Duration) -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryCache::default())),
            ttl,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn healthy(&self) -> bool {
        match &self.backend {
            Backend::Redis(client) => client.ping().await.unwrap_or(false),
            Backend::Memory(_) => true,
        }
    }

    /// Current index generation of an organization
    pub async fn generation(&self, organization_id: Uuid) -> Result<u64, CacheError> {
        match &self.backend {
            Backend::Redis(client) => {
                let value = client.get_counter(&generation_key(organization_id)).await?;
                Ok(value.max(0) as u64)
            }
            Backend::Memory(cache) => Ok(cache
                .generations
                .read()
                .await
                .get(&organization_id)
                .copied()
                .unwrap_or(0)),
        }
    }

    /// Invalidates every cached page of an organization
    pub async fn invalidate(&self, organization_id: Uuid) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Redis(client) => {
                client.incr(&generation_key(organization_id)).await?;
            }
            Backend::Memory(cache) => {
                *cache
                    .generations
                    .write()
                    .await
                    .entry(organization_id)
                    .or_insert(0) += 1;
            }
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match &self.backend {
            Backend::Redis(client) => Ok(client.get(key).await?),
            Backend::Memory(cache) => {
                let entries = cache.entries.read().await;
                Ok(entries
                    .get(key)
                    .filter(|e| e.expires_at > Instant::now())
                    .map(|e| e.value.clone()))
            }
        }
    }

    pub async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Redis(client) => {
                client.set_ex(key, &value, self.ttl.as_secs().max(1)).await?;
            }
            Backend::Memory(cache) => {
                let now = Instant::now();
                let mut entries = cache.entries.write().await;
                if entries.len() >= MEMORY_SWEEP_THRESHOLD {
                    entries.retain(|_, e| e.expires_at > now);
                }
                entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value,
                        expires_at: now + self.ttl,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_get_set() {
        let cache = SearchCache::memory(Duration::from_secs(60));
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v".to_string()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.backend_name(), "memory");
        assert!(cache.healthy().await);
    }

    #[tokio::test]
    async fn test_memory_entries_expire() {
        let cache = SearchCache::memory(Duration::from_millis(20));
        cache.set("k", "v".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_bumps_generation() {
        let cache = SearchCache::memory(Duration::from_secs(60));
        let org = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert_eq!(cache.generation(org).await.unwrap(), 0);
        cache.invalidate(org).await.unwrap();
        cache.invalidate(org).await.unwrap();

        assert_eq!(cache.generation(org).await.unwrap(), 2);
        assert_eq!(cache.generation(other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_orphans_old_keys() {
        let cache = SearchCache::memory(Duration::from_secs(60));
        let org = Uuid::new_v4();

        let before = result_key(org, cache.generation(org).await.unwrap(), "q");
        cache.set(&before, "cached".to_string()).await.unwrap();

        cache.invalidate(org).await.unwrap();
        let after = result_key(org, cache.generation(org).await.unwrap(), "q");

        assert_ne!(before, after);
        assert_eq!(cache.get(&after).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_cache() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let client = RedisClient::new(crate::redis::RedisConfig::new(url))
            .await
            .unwrap();
        let cache = SearchCache::redis(client, Duration::from_secs(30));
        let org = Uuid::new_v4();

        let generation = cache.generation(org).await.unwrap();
        let key = result_key(org, generation, "test");
        cache.set(&key, "value".to_string()).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("value"));

        cache.invalidate(org).await.unwrap();
        assert_eq!(cache.generation(org).await.unwrap(), generation + 1);
    }
}
