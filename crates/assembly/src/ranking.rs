//! Relevance ranking and the graph-aware filter.
//!
//! Pure functions over owned sequences. For project scope, chunks from
//! graph-linked entities are all kept and only the top fraction of the
//! rest survives; everywhere else ranking is by score alone.

use std::cmp::Ordering;
use std::collections::HashSet;

use contextloom_config::RankingConfig;
use contextloom_core::chunk::RetrievedChunk;

/// Result of [`graph_filter`].
#[derive(Debug, Clone)]
pub struct GraphFilterOutcome {
    pub chunks: Vec<RetrievedChunk>,
    pub linked: usize,
    pub unlinked_total: usize,
    pub unlinked_kept: usize,
}

/// Score descending; equal scores keep their input order.
pub fn rank_by_score(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut chunks = chunks;
    chunks.sort_by(by_score_desc);
    chunks
}

fn by_score_desc(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    b.relevance_score
        .partial_cmp(&a.relevance_score)
        .unwrap_or(Ordering::Equal)
}

/// How many of `unlinked` chunks to keep: `max(min, ceil(fraction × n))`,
/// never more than `n`, and zero only when `n` is zero.
pub fn unlinked_quota(unlinked: usize, config: &RankingConfig) -> usize {
    if unlinked == 0 {
        return 0;
    }
    // Round the fraction to 6 places so 0.2f32 does not ceil 5 × 0.2 to 2.
    let fraction = (config.unlinked_fraction as f64 * 1e6).round() / 1e6;
    let share = (fraction * unlinked as f64 - 1e-9).ceil().max(0.0) as usize;
    share.max(config.min_unlinked).max(1).min(unlinked)
}

/// Keep every chunk whose source is in `linked_ids`, plus the
/// top-scoring [`unlinked_quota`] of the others, then rank by score.
pub fn graph_filter(
    chunks: Vec<RetrievedChunk>,
    linked_ids: &HashSet<String>,
    config: &RankingConfig,
) -> GraphFilterOutcome {
    let (linked, unlinked): (Vec<_>, Vec<_>) = chunks
        .into_iter()
        .enumerate()
        .partition(|(_, c)| linked_ids.contains(&c.source_entity_id));

    let unlinked_total = unlinked.len();
    let quota = unlinked_quota(unlinked_total, config);

    let mut unlinked = unlinked;
    unlinked.sort_by(|(_, a), (_, b)| by_score_desc(a, b));
    unlinked.truncate(quota);

    let linked_count = linked.len();
    let mut merged: Vec<(usize, RetrievedChunk)> = linked.into_iter().chain(unlinked).collect();
    merged.sort_by(|(ia, a), (ib, b)| by_score_desc(a, b).then(ia.cmp(ib)));

    GraphFilterOutcome {
        chunks: merged.into_iter().map(|(_, c)| c).collect(),
        linked: linked_count,
        unlinked_total,
        unlinked_kept: quota,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_core::chunk::ChunkOrigin;

    fn chunk(id: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            source_entity_id: id.into(),
            source_type_id: "document".into(),
            content: format!("{id} content"),
            relevance_score: score,
            chunk_index: 0,
            token_count: 0,
            highlight: None,
            origin: ChunkOrigin::Vector,
        }
    }

    fn linked(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn ids(chunks: &[RetrievedChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.source_entity_id.as_str()).collect()
    }

    #[test]
    fn linked_chunks_kept_and_top_unlinked_fraction() {
        let chunks = vec![
            chunk("u2", 0.7),
            chunk("doc-1", 0.92),
            chunk("u1", 0.9),
            chunk("note-1", 0.88),
            chunk("u3", 0.4),
        ];
        let outcome = graph_filter(chunks, &linked(&["doc-1", "note-1"]), &RankingConfig::default());
        assert_eq!(ids(&outcome.chunks), vec!["doc-1", "u1", "note-1"]);
        assert_eq!(outcome.linked, 2);
        assert_eq!(outcome.unlinked_total, 3);
        assert_eq!(outcome.unlinked_kept, 1);
    }

    #[test]
    fn low_scoring_linked_chunks_survive() {
        let chunks = vec![chunk("u1", 0.95), chunk("doc-1", 0.05)];
        let outcome = graph_filter(chunks, &linked(&["doc-1"]), &RankingConfig::default());
        assert_eq!(ids(&outcome.chunks), vec!["u1", "doc-1"]);
    }

    #[test]
    fn quota_follows_fraction_with_floor_of_one() {
        let config = RankingConfig::default();
        assert_eq!(unlinked_quota(0, &config), 0);
        for n in 1..=5 {
            assert_eq!(unlinked_quota(n, &config), 1, "n = {n}");
        }
        assert_eq!(unlinked_quota(6, &config), 2);
        assert_eq!(unlinked_quota(10, &config), 2);
        assert_eq!(unlinked_quota(11, &config), 3);
        assert_eq!(unlinked_quota(1000, &config), 200);
    }

    #[test]
    fn never_drops_every_unlinked_chunk() {
        let chunks = vec![chunk("u1", 0.1)];
        let outcome = graph_filter(chunks, &linked(&["doc-1"]), &RankingConfig::default());
        assert_eq!(ids(&outcome.chunks), vec!["u1"]);
    }

    #[test]
    fn ties_keep_retrieval_order() {
        let chunks = vec![chunk("a", 0.5), chunk("b", 0.5), chunk("c", 0.5)];
        assert_eq!(ids(&rank_by_score(chunks.clone())), vec!["a", "b", "c"]);

        let outcome = graph_filter(chunks, &linked(&["a", "c"]), &RankingConfig::default());
        assert_eq!(ids(&outcome.chunks), vec!["a", "b", "c"]);
    }
}
