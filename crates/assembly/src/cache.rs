//! Cache manager — staleness-bounded snapshots of global-scope retrieval.
//!
//! Per key: MISS → fetch + store → FRESH → (age > staleness) → STALE →
//! (the read that notices deletes it) → MISS.
//!
//! Transport errors and corrupt payloads both read as a miss. Nothing in
//! here ever fails the request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use contextloom_config::{CacheConfig, SearchParams};
use contextloom_core::cache::KeyValueCache;
use contextloom_core::chunk::RetrievedChunk;
use contextloom_core::context::CacheStatus;
use contextloom_core::error::CacheError;
use contextloom_core::events::{self, operations};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Bumped whenever the payload layout changes; older payloads read as corrupt.
pub const PAYLOAD_VERSION: u32 = 1;

/// What is stored under a cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePayload {
    pub version: u32,
    pub chunks: Vec<RetrievedChunk>,
    pub cached_at: DateTime<Utc>,
}

impl CachePayload {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self::at(chunks, Utc::now())
    }

    pub fn at(chunks: Vec<RetrievedChunk>, cached_at: DateTime<Utc>) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            chunks,
            cached_at,
        }
    }
}

/// Result of a cache read.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub status: CacheStatus,
    /// Present only on a fresh hit.
    pub chunks: Option<Vec<RetrievedChunk>>,
}

impl CacheLookup {
    fn status(status: CacheStatus) -> Self {
        Self { status, chunks: None }
    }
}

pub struct CacheManager {
    cache: Option<Arc<dyn KeyValueCache>>,
    config: CacheConfig,
    timeout: Duration,
    sink: Arc<dyn ObservabilitySink>,
}

impl CacheManager {
    pub fn new(
        cache: Option<Arc<dyn KeyValueCache>>,
        config: CacheConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        let timeout = Duration::from_millis(config.call_timeout_ms);
        Self {
            cache,
            config,
            timeout,
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.cache.is_some()
    }

    /// `prefix:tenant:global:<sha256 of normalized query and search params>`.
    pub fn key_for(&self, tenant_id: &str, query: &str, params: SearchParams) -> String {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"\n");
        hasher.update(params.top_k.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(format!("{:.4}", params.min_score).as_bytes());
        format!(
            "{}:{}:global:{:x}",
            self.config.key_prefix,
            tenant_id,
            hasher.finalize()
        )
    }

    pub async fn read(&self, tenant_id: &str, key: &str) -> CacheLookup {
        let Some(cache) = self.client() else {
            return CacheLookup::status(CacheStatus::Disabled);
        };

        let raw = match self.call(cache.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "Cache miss");
                self.sink
                    .track_event(events::CACHE_MISS, serde_json::json!({ "tenant_id": tenant_id, "key": key }));
                return CacheLookup::status(CacheStatus::Miss);
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                self.sink.track_exception(
                    &e,
                    ExceptionContext::new(operations::CACHE_READ, tenant_id)
                        .with_details(serde_json::json!({ "key": key })),
                );
                self.sink.track_event(
                    events::CACHE_READ_FAILED,
                    serde_json::json!({ "tenant_id": tenant_id, "key": key }),
                );
                return CacheLookup::status(CacheStatus::Error);
            }
        };

        let payload = match decode(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Cache payload corrupt, treating as miss");
                self.sink.track_exception(
                    &e,
                    ExceptionContext::new(operations::CACHE_READ, tenant_id)
                        .with_details(serde_json::json!({ "key": key })),
                );
                self.sink.track_event(
                    events::CACHE_PAYLOAD_CORRUPT,
                    serde_json::json!({ "tenant_id": tenant_id, "key": key }),
                );
                return CacheLookup::status(CacheStatus::Error);
            }
        };

        let age = Utc::now() - payload.cached_at;
        let age_secs = age.num_seconds();
        if age > self.staleness() {
            if let Err(e) = self.call(cache.del(key)).await {
                // The entry expires by TTL anyway.
                debug!(key, error = %e, "Failed to delete stale cache entry");
            }
            debug!(key, age_secs, "Cache entry stale, invalidated");
            self.sink.track_event(
                events::CACHE_INVALIDATED_STALE,
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "key": key,
                    "age_secs": age_secs,
                    "staleness_secs": self.config.staleness_secs,
                }),
            );
            return CacheLookup::status(CacheStatus::Stale);
        }

        debug!(key, age_secs, chunks = payload.chunks.len(), "Cache hit");
        self.sink.track_event(
            events::CACHE_HIT,
            serde_json::json!({ "tenant_id": tenant_id, "key": key, "age_secs": age_secs }),
        );
        CacheLookup {
            status: CacheStatus::Hit,
            chunks: Some(payload.chunks),
        }
    }

    /// Store a snapshot. Returns whether the write succeeded.
    pub async fn write(&self, tenant_id: &str, key: &str, chunks: &[RetrievedChunk]) -> bool {
        let Some(cache) = self.client() else {
            return false;
        };
        let payload = CachePayload::new(chunks.to_vec());
        let result = match serde_json::to_string(&payload) {
            Ok(value) => self.call(cache.set(key, value, self.config.ttl_secs)).await,
            Err(e) => Err(CacheError::Corrupt(e.to_string())),
        };
        match result {
            Ok(()) => {
                debug!(key, chunks = chunks.len(), ttl_secs = self.config.ttl_secs, "Cache entry written");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Cache write failed");
                self.sink.track_exception(
                    &e,
                    ExceptionContext::new(operations::CACHE_WRITE, tenant_id)
                        .with_details(serde_json::json!({ "key": key })),
                );
                self.sink.track_event(
                    events::CACHE_WRITE_FAILED,
                    serde_json::json!({ "tenant_id": tenant_id, "key": key }),
                );
                false
            }
        }
    }

    fn staleness(&self) -> TimeDelta {
        i64::try_from(self.config.staleness_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    fn client(&self) -> Option<&Arc<dyn KeyValueCache>> {
        if self.config.enabled {
            self.cache.as_ref()
        } else {
            None
        }
    }

    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn decode(raw: &str) -> Result<CachePayload, CacheError> {
    let payload: CachePayload =
        serde_json::from_str(raw).map_err(|e| CacheError::Corrupt(e.to_string()))?;
    if payload.version != PAYLOAD_VERSION {
        return Err(CacheError::Corrupt(format!(
            "payload version {} (expected {PAYLOAD_VERSION})",
            payload.version
        )));
    }
    Ok(payload)
}
