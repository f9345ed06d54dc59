//! No-op backends — for deployments without a search index or cache.

use async_trait::async_trait;
use contextloom_core::cache::KeyValueCache;
use contextloom_core::chunk::{SearchBackend, SearchHit, SearchRequest};
use contextloom_core::error::{CacheError, RetrievalError};

/// A search backend that never finds anything.
pub struct NoopSearch;

#[async_trait]
impl SearchBackend for NoopSearch {
    fn name(&self) -> &str {
        "noop"
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// A cache that stores nothing: every read misses.
pub struct NoopCache;

#[async_trait]
impl KeyValueCache for NoopCache {
    fn name(&self) -> &str {
        "noop"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), CacheError> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set("k", "v".into(), 60).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn noop_search_is_empty() {
        let hits = NoopSearch
            .search(&SearchRequest {
                tenant_id: "t1".into(),
                query: "anything".into(),
                top_k: 10,
                min_score: 0.0,
            })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
