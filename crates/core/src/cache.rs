//! Key-value cache client — an external, externally-synchronized service.
//!
//! Values are opaque strings; the engine owns the payload format.

use async_trait::async_trait;

use crate::error::CacheError;

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;

    /// Store a value that the cache itself expires after `ttl_secs`.
    async fn set(&self, key: &str, value: String, ttl_secs: u64)
    -> std::result::Result<(), CacheError>;

    async fn del(&self, key: &str) -> std::result::Result<(), CacheError>;
}
