use crate::{Cache, CoreError};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

const KEY_PREFIX: &str = "kigo-support:";

/// Redis implementation of the Cache port, shared across service replicas.
/// Keys are namespaced so the instance can be shared with other services.
#[derive(Clone, Debug)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    default_ttl_seconds: u64,
}

impl RedisCache {
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| CoreError::Connection(format!("Redis unreachable: {}", e)))?;
        info!("Redis result cache connected.");
        Ok(Self {
            connection,
            default_ttl_seconds,
        })
    }

    fn namespaced(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.connection.clone();
        conn.get(Self::namespaced(key))
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<(), CoreError> {
        let mut conn = self.connection.clone();
        // SETEX rejects a zero expiry
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds).max(1);

        conn.set_ex(Self::namespaced(key), value, ttl)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }
}
