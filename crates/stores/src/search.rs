//! In-memory search backends.
//!
//! - [`StaticSearch`]: returns a fixed, pre-scored hit list. Stands in for
//!   a vector index whose scores come from embeddings computed elsewhere.
//! - [`KeywordIndex`]: scores documents by query-term coverage. Serves as
//!   the keyword/hybrid fallback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use contextloom_core::chunk::{SearchBackend, SearchHit, SearchRequest};
use contextloom_core::error::RetrievalError;
use tokio::sync::RwLock;

fn rank(mut hits: Vec<SearchHit>, request: &SearchRequest) -> Vec<SearchHit> {
    hits.retain(|h| h.score >= request.min_score);
    // Stable sort keeps insertion order among equal scores.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(request.top_k);
    hits
}

/// A backend that answers every query with the same scored hits.
pub struct StaticSearch {
    name: String,
    hits: Arc<RwLock<Vec<SearchHit>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new(name: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        Self {
            name: name.into(),
            hits: Arc::new(RwLock::new(hits)),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// A backend whose every call fails.
    pub fn failing(name: impl Into<String>) -> Self {
        let search = Self::new(name, Vec::new());
        search.set_failing(true);
        search
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn set_hits(&self, hits: Vec<SearchHit>) {
        *self.hits.write().await = hits;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for StaticSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::BackendFailed {
                backend: self.name.clone(),
                reason: "index unavailable".into(),
            });
        }
        let hits = self.hits.read().await.clone();
        Ok(rank(hits, request))
    }
}

/// A document held by the keyword index.
#[derive(Debug, Clone)]
struct IndexedDocument {
    tenant_id: String,
    entity_id: String,
    entity_type_id: String,
    chunk_index: usize,
    content: String,
}

/// Term-coverage keyword search: score = share of distinct query terms
/// (3+ characters) that occur in the document.
pub struct KeywordIndex {
    name: String,
    documents: Arc<RwLock<Vec<IndexedDocument>>>,
    failing: AtomicBool,
}

impl KeywordIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Arc::new(RwLock::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn add_document(
        &self,
        tenant_id: &str,
        entity_id: &str,
        entity_type_id: &str,
        chunk_index: usize,
        content: &str,
    ) {
        self.documents.write().await.push(IndexedDocument {
            tenant_id: tenant_id.into(),
            entity_id: entity_id.into(),
            entity_type_id: entity_type_id.into(),
            chunk_index,
            content: content.into(),
        });
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl SearchBackend for KeywordIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, RetrievalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::BackendFailed {
                backend: self.name.clone(),
                reason: "keyword index unavailable".into(),
            });
        }
        let terms = query_terms(&request.query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.documents.read().await;
        let hits: Vec<SearchHit> = documents
            .iter()
            .filter(|d| d.tenant_id == request.tenant_id)
            .filter_map(|d| {
                let content = d.content.to_lowercase();
                let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                Some(SearchHit {
                    entity_id: d.entity_id.clone(),
                    entity_type_id: d.entity_type_id.clone(),
                    content: d.content.clone(),
                    score: matched as f32 / terms.len() as f32,
                    chunk_index: Some(d.chunk_index),
                    highlight: None,
                })
            })
            .collect();

        Ok(rank(hits, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str, top_k: usize, min_score: f32) -> SearchRequest {
        SearchRequest {
            tenant_id: "t1".into(),
            query: query.into(),
            top_k,
            min_score,
        }
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            entity_id: id.into(),
            entity_type_id: "document".into(),
            content: format!("{id} body"),
            score,
            chunk_index: Some(0),
            highlight: None,
        }
    }

    #[tokio::test]
    async fn static_search_ranks_and_truncates() {
        let search = StaticSearch::new(
            "vector",
            vec![hit("a", 0.4), hit("b", 0.9), hit("c", 0.7), hit("d", 0.1)],
        );
        let hits = search.search(&request("anything", 2, 0.2)).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_static_search_errors() {
        let search = StaticSearch::failing("vector");
        let err = search.search(&request("q", 5, 0.0)).await.unwrap_err();
        assert!(err.to_string().contains("vector"));
    }

    #[tokio::test]
    async fn keyword_index_scores_term_coverage() {
        let index = KeywordIndex::new("keyword");
        index
            .add_document("t1", "doc-1", "document", 0, "Revenue forecast for Apollo")
            .await;
        index
            .add_document("t1", "doc-2", "document", 0, "Apollo launch checklist")
            .await;
        index
            .add_document("t2", "doc-3", "document", 0, "Apollo revenue forecast")
            .await;

        let hits = index
            .search(&request("apollo revenue", 10, 0.0))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entity_id, "doc-1");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn short_terms_are_ignored() {
        let index = KeywordIndex::new("keyword");
        index.add_document("t1", "doc-1", "document", 0, "a b c").await;
        assert!(index.search(&request("a b", 10, 0.0)).await.unwrap().is_empty());
        assert_eq!(index.len().await, 1);
    }
}
