use super::{CatalogEntry, Resolution, ResultSet};
use crate::{Cache, CoreError};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::{future::Future, sync::Arc};
use tracing::{debug, warn};

const RESOLVER_KEY: &str = "resolver";

/// Content-addressed result cache in front of the catalog.
///
/// Key: `q:v1:<name>:<sha256 of name + canonical JSON params>`. Value: the
/// serialized result set, whose `fetched_at` records when it was read.
/// Entries live for `ttl_seconds`. Only live results are stored, so an
/// outage is never replayed from cache.
#[derive(Clone)]
pub struct CachedQueries {
    cache: Arc<dyn Cache>,
    ttl_seconds: u64,
}

impl CachedQueries {
    pub fn new(cache: Arc<dyn Cache>, ttl_seconds: u64) -> Self {
        Self { cache, ttl_seconds }
    }

    pub fn key<P: Serialize + ?Sized>(name: &str, params: &P) -> Result<String, CoreError> {
        let canonical = serde_json::to_vec(&(name, params))?;
        let digest = Sha256::digest(&canonical);
        Ok(format!("q:v1:{name}:{}", hex::encode(digest)))
    }

    pub async fn result_set<R, P, F, Fut>(
        &self,
        entry: CatalogEntry,
        params: &P,
        load: F,
    ) -> Result<ResultSet<R>, CoreError>
    where
        R: Serialize + DeserializeOwned,
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResultSet<R>, CoreError>>,
    {
        let key = Self::key(entry.as_str(), params)?;
        if let Some(mut hit) = self.lookup::<ResultSet<R>>(&key).await {
            debug!("cache hit {} key={}", entry.as_str(), key);
            hit.from_cache = true;
            return Ok(hit);
        }

        let fresh = load().await?;
        if fresh.is_live() {
            self.store(&key, &fresh).await;
        }
        Ok(fresh)
    }

    /// Only successful resolutions are kept: a phone number registered a
    /// moment ago must not stay "not found".
    pub async fn resolution<P, F, Fut>(&self, params: &P, load: F) -> Result<Resolution, CoreError>
    where
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resolution, CoreError>>,
    {
        let key = Self::key(RESOLVER_KEY, params)?;
        if let Some(hit) = self.lookup::<Resolution>(&key).await {
            debug!("cache hit resolver key={}", key);
            return Ok(hit);
        }

        let fresh = load().await?;
        if matches!(fresh, Resolution::Resolved(_)) {
            self.store(&key, &fresh).await;
        }
        Ok(fresh)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("discarding unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &bytes, Some(self.ttl_seconds)).await {
            warn!("cache write failed for {}: {}", key, e);
        }
    }
}
