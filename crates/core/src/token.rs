//! Token estimation over context fragments.
//!
//! The budgeter never counts tokens itself; it asks an injected
//! [`TokenEstimator`]. The default heuristic is ~4 characters per token,
//! rounded up, over the fragment exactly as it will be rendered.

use crate::chunk::RetrievedChunk;
use crate::entity::Entity;

/// One unit of context that costs tokens.
#[derive(Debug, Clone, Copy)]
pub enum Fragment<'a> {
    Primary(&'a Entity),
    Related(&'a Entity),
    Chunk(&'a RetrievedChunk),
}

impl Fragment<'_> {
    /// The fragment as it appears in the formatted context.
    pub fn render(&self) -> String {
        match self {
            Fragment::Primary(entity) | Fragment::Related(entity) => render_entity(entity),
            Fragment::Chunk(chunk) => render_chunk(chunk),
        }
    }

    /// The entity this fragment is about.
    pub fn source_id(&self) -> &str {
        match self {
            Fragment::Primary(entity) | Fragment::Related(entity) => &entity.id,
            Fragment::Chunk(chunk) => &chunk.source_entity_id,
        }
    }
}

fn render_entity(entity: &Entity) -> String {
    let mut out = format!(
        "{} ({}, id: {})\n",
        entity.display_name, entity.type_id, entity.id
    );
    for (key, value) in &entity.structured_data {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("  {key}: {value}\n"));
    }
    out
}

fn render_chunk(chunk: &RetrievedChunk) -> String {
    format!(
        "[Source: {}/{}#{} | relevance {:.2}] {}\n",
        chunk.source_type_id,
        chunk.source_entity_id,
        chunk.chunk_index,
        chunk.relevance_score,
        chunk.content
    )
}

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, fragment: &Fragment<'_>) -> usize;
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Character-based estimator over the rendered fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, fragment: &Fragment<'_>) -> usize {
        estimate_tokens(&fragment.render())
    }
}
