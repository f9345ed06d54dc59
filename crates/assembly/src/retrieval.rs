//! Retrieval gateway — semantic search with a keyword fallback.
//!
//! 1. Query the semantic backend.
//! 2. If it fails, returns nothing, or returns fewer than
//!    `fallback_ratio × top_k` hits, query the keyword backend. Its hits
//!    replace an empty/failed semantic result and supplement a partial one.
//! 3. De-duplicate by `(source_entity_id, chunk_index)`, keeping the higher
//!    score, then rank by score and cap at `top_k`.
//!
//! With `eager_fallback` both backends are queried concurrently; the merge
//! rule is the same, so the result does not depend on the mode.
//!
//! Retrieval never fails the request: if both paths fail the outcome is
//! empty and the failure is recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use contextloom_config::{RetrievalConfig, SearchParams};
use contextloom_core::chunk::{ChunkOrigin, RetrievedChunk, SearchBackend, SearchHit, SearchRequest};
use contextloom_core::context::RetrievalMethod;
use contextloom_core::error::RetrievalError;
use contextloom_core::events::{self, operations};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};
use tracing::{debug, info, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// What one retrieval produced.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Ranked by score, descending; retrieval order breaks ties.
    pub chunks: Vec<RetrievedChunk>,
    pub method: RetrievalMethod,
    pub fallback_used: bool,
    /// Backends that failed during this retrieval.
    pub degraded: Vec<&'static str>,
}

impl RetrievalOutcome {
    fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            method: RetrievalMethod::None,
            fallback_used: false,
            degraded: Vec::new(),
        }
    }

    /// Whether any backend failed.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Why the keyword backend was consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackReason {
    Error,
    Empty,
    Partial,
}

impl FallbackReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Empty => "empty",
            Self::Partial => "partial",
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────

pub struct RetrievalGateway {
    semantic: Option<Arc<dyn SearchBackend>>,
    keyword: Option<Arc<dyn SearchBackend>>,
    fallback_ratio: f32,
    eager: bool,
    timeout: Duration,
    sink: Arc<dyn ObservabilitySink>,
}

impl RetrievalGateway {
    pub fn new(
        semantic: Option<Arc<dyn SearchBackend>>,
        keyword: Option<Arc<dyn SearchBackend>>,
        config: &RetrievalConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            semantic,
            keyword,
            fallback_ratio: config.fallback_ratio,
            eager: config.eager_fallback,
            timeout: Duration::from_millis(config.call_timeout_ms),
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.semantic.is_some() || self.keyword.is_some()
    }

    /// Minimum semantic hit count that does not trigger the fallback.
    pub fn fallback_threshold(&self, top_k: usize) -> usize {
        (self.fallback_ratio as f64 * top_k as f64).ceil() as usize
    }

    pub async fn retrieve(&self, tenant_id: &str, query: &str, params: SearchParams) -> RetrievalOutcome {
        if !self.is_enabled() {
            return RetrievalOutcome::empty();
        }
        let request = SearchRequest {
            tenant_id: tenant_id.to_string(),
            query: query.to_string(),
            top_k: params.top_k,
            min_score: params.min_score,
        };

        let mut outcome = RetrievalOutcome::empty();

        let (semantic, eager_keyword) = if self.eager && self.keyword.is_some() {
            let (s, k) = tokio::join!(self.semantic_search(&request), self.keyword_search(&request));
            (s, Some(k))
        } else {
            (self.semantic_search(&request).await, None)
        };

        let semantic_chunks = match semantic {
            Ok(hits) => normalize(hits, ChunkOrigin::Vector, params.min_score),
            Err(e) => {
                self.record_failure(tenant_id, operations::SEMANTIC_SEARCH, &e);
                outcome.degraded.push(operations::SEMANTIC_SEARCH);
                Vec::new()
            }
        };
        let semantic_failed = outcome.is_degraded();

        let reason = if semantic_failed {
            Some(FallbackReason::Error)
        } else if semantic_chunks.is_empty() {
            Some(FallbackReason::Empty)
        } else if semantic_chunks.len() < self.fallback_threshold(params.top_k) {
            Some(FallbackReason::Partial)
        } else {
            None
        };

        let mut keyword_chunks = Vec::new();
        if let (Some(reason), Some(_)) = (reason, &self.keyword) {
            let keyword = match eager_keyword {
                Some(result) => result,
                None => self.keyword_search(&request).await,
            };
            match keyword {
                Ok(hits) => {
                    keyword_chunks = normalize(hits, ChunkOrigin::KeywordFallback, params.min_score);
                }
                Err(e) => {
                    self.record_failure(tenant_id, operations::KEYWORD_SEARCH, &e);
                    outcome.degraded.push(operations::KEYWORD_SEARCH);
                }
            }
            debug!(
                reason = reason.as_str(),
                semantic = semantic_chunks.len(),
                keyword = keyword_chunks.len(),
                "Keyword fallback consulted"
            );
        }

        let semantic_count = semantic_chunks.len();
        let mut chunks = merge(semantic_chunks, keyword_chunks);
        chunks.truncate(params.top_k);

        let keyword_kept = chunks
            .iter()
            .filter(|c| c.origin == ChunkOrigin::KeywordFallback)
            .count();
        outcome.fallback_used = keyword_kept > 0;
        outcome.method = match (chunks.len(), keyword_kept) {
            (0, _) => RetrievalMethod::None,
            (_, 0) => RetrievalMethod::Vector,
            (n, k) if n == k => RetrievalMethod::KeywordFallback,
            _ => RetrievalMethod::Hybrid,
        };

        if outcome.fallback_used {
            info!(
                tenant_id = %tenant_id,
                reason = ?reason.map(FallbackReason::as_str),
                keyword_chunks = keyword_kept,
                "Retrieval fallback used"
            );
            self.sink.track_event(
                events::RETRIEVAL_FALLBACK_USED,
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "reason": reason.map(FallbackReason::as_str),
                    "semantic_count": semantic_count,
                    "keyword_count": keyword_kept,
                    "top_k": params.top_k,
                }),
            );
        }

        if chunks.is_empty() && outcome.is_degraded() {
            warn!(tenant_id = %tenant_id, "Retrieval failed on every path, continuing without chunks");
            self.sink.track_event(
                events::RETRIEVAL_FAILED,
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "failed": outcome.degraded,
                }),
            );
        }

        outcome.chunks = chunks;
        outcome
    }

    async fn semantic_search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
        match &self.semantic {
            Some(backend) => self.search_with_timeout(backend.as_ref(), request).await,
            // An absent backend behaves as one that finds nothing.
            None => Ok(Vec::new()),
        }
    }

    async fn keyword_search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
        match &self.keyword {
            Some(backend) => self.search_with_timeout(backend.as_ref(), request).await,
            None => Ok(Vec::new()),
        }
    }

    async fn search_with_timeout(
        &self,
        backend: &dyn SearchBackend,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        match tokio::time::timeout(self.timeout, backend.search(request)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout {
                backend: backend.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn record_failure(&self, tenant_id: &str, operation: &'static str, error: &RetrievalError) {
        warn!(operation, error = %error, "Search backend failed");
        self.sink.track_exception(
            error,
            ExceptionContext::new(operation, tenant_id),
        );
    }
}

// ── Pure helpers ──────────────────────────────────────────────────────────

/// Clamp scores, default chunk indexes, drop hits below `min_score`.
fn normalize(hits: Vec<SearchHit>, origin: ChunkOrigin, min_score: f32) -> Vec<RetrievedChunk> {
    hits.into_iter()
        .map(|hit| RetrievedChunk::from_hit(hit, origin))
        .filter(|c| c.relevance_score >= min_score)
        .collect()
}

/// Semantic chunks first, then keyword chunks; duplicates keep the higher
/// score at the first-seen position. Result sorted by score, stable.
fn merge(primary: Vec<RetrievedChunk>, secondary: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut merged: Vec<RetrievedChunk> = Vec::with_capacity(primary.len() + secondary.len());
    let mut positions: HashMap<(String, usize), usize> = HashMap::new();

    for chunk in primary.into_iter().chain(secondary) {
        let (source, index) = chunk.key();
        let key = (source.to_string(), index);
        match positions.get(&key) {
            Some(&pos) => {
                if chunk.relevance_score > merged[pos].relevance_score {
                    merged[pos] = chunk;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(chunk);
            }
        }
    }

    crate::ranking::rank_by_score(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_stores::StaticSearch;
    use contextloom_telemetry::TelemetryEngine;

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            entity_id: id.into(),
            entity_type_id: "document".into(),
            content: format!("content of {id}"),
            score,
            chunk_index: Some(0),
            highlight: None,
        }
    }

    fn params(top_k: usize) -> SearchParams {
        SearchParams::new(top_k, 0.0)
    }

    fn gateway(
        semantic: Option<Arc<dyn SearchBackend>>,
        keyword: Option<Arc<dyn SearchBackend>>,
        eager: bool,
    ) -> (RetrievalGateway, Arc<TelemetryEngine>) {
        let telemetry = Arc::new(TelemetryEngine::new());
        let config = RetrievalConfig {
            eager_fallback: eager,
            ..RetrievalConfig::default()
        };
        (
            RetrievalGateway::new(semantic, keyword, &config, telemetry.clone()),
            telemetry,
        )
    }

    fn ids(chunks: &[RetrievedChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.source_entity_id.as_str()).collect()
    }

    #[tokio::test]
    async fn full_semantic_result_skips_fallback() {
        let semantic = Arc::new(StaticSearch::new("vector", vec![hit("a", 0.9), hit("b", 0.8)]));
        let keyword = Arc::new(StaticSearch::new("keyword", vec![hit("k", 0.5)]));
        let (gateway, telemetry) = gateway(Some(semantic), Some(keyword.clone()), false);

        let outcome = gateway.retrieve("t1", "q", params(4)).await;
        assert_eq!(ids(&outcome.chunks), vec!["a", "b"]);
        assert_eq!(outcome.method, RetrievalMethod::Vector);
        assert!(!outcome.fallback_used);
        assert_eq!(keyword.call_count(), 0);
        assert!(!telemetry.has_event(events::RETRIEVAL_FALLBACK_USED));
    }

    #[tokio::test]
    async fn semantic_failure_is_replaced_by_keyword() {
        let semantic = Arc::new(StaticSearch::failing("vector"));
        let keyword = Arc::new(StaticSearch::new("keyword", vec![hit("k1", 0.6), hit("k2", 0.4)]));
        let (gateway, telemetry) = gateway(Some(semantic), Some(keyword), false);

        let outcome = gateway.retrieve("t1", "q", params(10)).await;
        assert_eq!(ids(&outcome.chunks), vec!["k1", "k2"]);
        assert_eq!(outcome.method, RetrievalMethod::KeywordFallback);
        assert!(outcome.fallback_used);
        assert_eq!(outcome.degraded, vec![operations::SEMANTIC_SEARCH]);
        assert!(outcome.chunks.iter().all(|c| c.origin == ChunkOrigin::KeywordFallback));

        let fallback = telemetry.events_named(events::RETRIEVAL_FALLBACK_USED);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].prop_str("reason"), Some("error"));
        assert_eq!(telemetry.exceptions_for(operations::SEMANTIC_SEARCH).len(), 1);
    }

    #[tokio::test]
    async fn partial_result_is_supplemented_and_deduplicated() {
        // top_k 10, ratio 0.5: 2 semantic hits < 5 triggers the fallback.
        let semantic = Arc::new(StaticSearch::new("vector", vec![hit("a", 0.9), hit("b", 0.5)]));
        let keyword = Arc::new(StaticSearch::new("keyword", vec![hit("b", 0.7), hit("c", 0.6)]));
        let (gateway, telemetry) = gateway(Some(semantic), Some(keyword), false);

        let outcome = gateway.retrieve("t1", "q", params(10)).await;
        assert_eq!(ids(&outcome.chunks), vec!["a", "b", "c"]);
        // Duplicate kept the higher keyword score.
        assert!((outcome.chunks[1].relevance_score - 0.7).abs() < 1e-6);
        assert_eq!(outcome.chunks[1].origin, ChunkOrigin::KeywordFallback);
        assert_eq!(outcome.chunks[0].origin, ChunkOrigin::Vector);
        assert_eq!(outcome.method, RetrievalMethod::Hybrid);

        let fallback = telemetry.events_named(events::RETRIEVAL_FALLBACK_USED);
        assert_eq!(fallback[0].prop_str("reason"), Some("partial"));
    }

    #[tokio::test]
    async fn both_paths_failing_yields_empty_outcome() {
        let (gateway, telemetry) = gateway(
            Some(Arc::new(StaticSearch::failing("vector"))),
            Some(Arc::new(StaticSearch::failing("keyword"))),
            false,
        );

        let outcome = gateway.retrieve("t1", "q", params(10)).await;
        assert!(outcome.chunks.is_empty());
        assert_eq!(outcome.method, RetrievalMethod::None);
        assert_eq!(outcome.degraded.len(), 2);
        assert!(telemetry.has_event(events::RETRIEVAL_FAILED));
        assert!(!telemetry.has_event(events::RETRIEVAL_FALLBACK_USED));
    }

    #[tokio::test]
    async fn no_backends_is_empty_without_diagnostics() {
        let (gateway, telemetry) = gateway(None, None, false);
        let outcome = gateway.retrieve("t1", "q", params(10)).await;
        assert!(outcome.chunks.is_empty());
        assert!(!outcome.is_degraded());
        assert!(telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn eager_mode_matches_sequential_merge() {
        let semantic = Arc::new(StaticSearch::new("vector", vec![hit("a", 0.9), hit("b", 0.8)]));
        let keyword = Arc::new(StaticSearch::new("keyword", vec![hit("k", 0.5)]));
        let (gateway, _) = gateway(Some(semantic), Some(keyword.clone()), true);

        let outcome = gateway.retrieve("t1", "q", params(4)).await;
        // Keyword ran concurrently, but a full semantic result is not supplemented.
        assert_eq!(keyword.call_count(), 1);
        assert_eq!(ids(&outcome.chunks), vec!["a", "b"]);
        assert!(!outcome.fallback_used);
    }

    #[tokio::test]
    async fn scores_are_clamped_and_filtered() {
        let semantic = Arc::new(StaticSearch::new(
            "vector",
            vec![hit("a", 1.7), hit("b", 0.2), hit("c", f32::NAN)],
        ));
        let (gateway, _) = gateway(Some(semantic), None, false);

        let outcome = gateway.retrieve("t1", "q", SearchParams::new(1, 0.0)).await;
        assert_eq!(ids(&outcome.chunks), vec!["a"]);
        assert_eq!(outcome.chunks[0].relevance_score, 1.0);
    }

    #[test]
    fn threshold_rounds_up() {
        let (gateway, _) = gateway(None, None, false);
        assert_eq!(gateway.fallback_threshold(10), 5);
        assert_eq!(gateway.fallback_threshold(5), 3);
        assert_eq!(gateway.fallback_threshold(0), 0);
    }
}
