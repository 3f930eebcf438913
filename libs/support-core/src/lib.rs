use async_trait::async_trait;
use std::error::Error as StdError;

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod domain;

// Common error type for the support core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Missing or malformed secret / setting.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Tunnel or database unreachable, rejected credentials, timeout.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Malformed parameters or an underlying store failure while querying.
    #[error("Query error: {0}")]
    Query(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
}

impl CoreError {
    /// Errors worth another connection attempt. Bad configuration never is.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Connection(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

// Port for caching serialized result sets
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<(), CoreError>;
}
