//! Retrieved chunks and the search backends that produce them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// Which retrieval path produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOrigin {
    Vector,
    KeywordFallback,
}

/// A search request, shared by the semantic and keyword backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub tenant_id: String,
    pub query: String,
    pub top_k: usize,
    pub min_score: f32,
}

/// One raw hit as returned by a search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity_id: String,
    pub entity_type_id: String,
    pub content: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

/// A scored unit of retrieved text tied to one source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub source_entity_id: String,
    pub source_type_id: String,
    pub content: String,
    /// Relevance in [0, 1].
    pub relevance_score: f32,
    pub chunk_index: usize,
    /// Estimated cost; filled in by the token budgeter.
    #[serde(default)]
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    pub origin: ChunkOrigin,
}

impl RetrievedChunk {
    /// Normalize a raw hit: clamp the score and default the chunk index.
    pub fn from_hit(hit: SearchHit, origin: ChunkOrigin) -> Self {
        let score = if hit.score.is_finite() {
            hit.score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            source_entity_id: hit.entity_id,
            source_type_id: hit.entity_type_id,
            content: hit.content,
            relevance_score: score,
            chunk_index: hit.chunk_index.unwrap_or(0),
            token_count: 0,
            highlight: hit.highlight,
            origin,
        }
    }

    /// De-duplication key: one chunk per (source entity, chunk index).
    pub fn key(&self) -> (&str, usize) {
        (self.source_entity_id.as_str(), self.chunk_index)
    }
}

/// A search capability (semantic/vector or keyword/hybrid).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// The backend name (e.g., "vector", "keyword").
    fn name(&self) -> &str;

    async fn search(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<Vec<SearchHit>, RetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f32, chunk_index: Option<usize>) -> SearchHit {
        SearchHit {
            entity_id: "doc-1".into(),
            entity_type_id: "document".into(),
            content: "quarterly revenue grew".into(),
            score,
            chunk_index,
            highlight: None,
        }
    }

    #[test]
    fn from_hit_clamps_score_and_defaults_index() {
        let chunk = RetrievedChunk::from_hit(hit(1.7, None), ChunkOrigin::Vector);
        assert_eq!(chunk.relevance_score, 1.0);
        assert_eq!(chunk.chunk_index, 0);
        assert_eq!(chunk.origin, ChunkOrigin::Vector);
    }

    #[test]
    fn non_finite_scores_become_zero() {
        let chunk = RetrievedChunk::from_hit(hit(f32::NAN, Some(3)), ChunkOrigin::KeywordFallback);
        assert_eq!(chunk.relevance_score, 0.0);
        assert_eq!(chunk.key(), ("doc-1", 3));
    }
}
