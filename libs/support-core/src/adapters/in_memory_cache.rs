use crate::{Cache, CoreError};
use async_trait::async_trait;
use moka::{Expiry, future::Cache as MokaCache};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Clone, Debug)]
struct Entry {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Expires every entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory implementation of the Cache port using Moka.
/// Used when no Redis URL is configured and in tests.
#[derive(Clone)]
pub struct InMemoryCache {
    cache: MokaCache<String, Entry>,
    default_ttl: Duration,
}

impl InMemoryCache {
    pub fn new(max_capacity: u64, default_ttl_seconds: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            cache,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }
}

impl Default for InMemoryCache {
    /// 10,000 entries, one minute: query results go stale quickly.
    fn default() -> Self {
        Self::new(10_000, 60)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.bytes.to_vec()))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<(), CoreError> {
        let ttl = ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl);
        let entry = Entry {
            bytes: Arc::from(value),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::default();
        let value = br#"{"rows":[]}"#.to_vec();

        cache.set("q:v1:cards:abc", &value, None).await.unwrap();
        let retrieved = cache.get("q:v1:cards:abc").await.unwrap();

        assert_eq!(retrieved, Some(value));
    }

    #[tokio::test]
    async fn test_get_non_existent() {
        let cache = InMemoryCache::default();
        assert_eq!(cache.get("q:v1:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_explicit_ttl_overrides_default() {
        // Long default, short per-entry TTL
        let cache = InMemoryCache::new(100, 3600);
        let value = b"short_lived".to_vec();

        cache.set("ttl_key", &value, Some(1)).await.unwrap();
        assert_eq!(cache.get("ttl_key").await.unwrap(), Some(value));

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(
            cache.get("ttl_key").await.unwrap(),
            None,
            "entry should expire after its own TTL"
        );
    }

    #[tokio::test]
    async fn test_entry_expires_based_on_default_ttl() {
        let cache = InMemoryCache::new(100, 1);
        let value = b"ttl_value".to_vec();

        cache.set("default_ttl_key", &value, None).await.unwrap();
        assert_eq!(cache.get("default_ttl_key").await.unwrap(), Some(value));

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("default_ttl_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let cache = InMemoryCache::new(100, 3600);
        cache.set("k", b"v1", Some(1)).await.unwrap();
        cache.set("k", b"v2", Some(3600)).await.unwrap();

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }
}
