//! Token budgeter — fits the context under a hard ceiling.
//!
//! A fixed overhead is reserved for wrapper text. If the estimated cost of
//! every fragment exceeds what is left, fragments are evicted one at a
//! time in this order until the rest fits:
//!
//! 1. unlinked chunks, lowest score first
//! 2. linked chunks, lowest score first (unless
//!    [`LinkedEvictionPolicy::Protect`])
//! 3. related entities, last declared first
//!
//! The primary entity is never evicted. Equal scores evict the later
//! retrieved chunk first. Survivors keep their input order, so running the
//! budgeter twice evicts nothing the second time.

use std::collections::HashSet;
use std::sync::Arc;

use contextloom_config::{BudgetConfig, LinkedEvictionPolicy};
use contextloom_core::chunk::RetrievedChunk;
use contextloom_core::context::TruncationInfo;
use contextloom_core::entity::Entity;
use contextloom_core::token::{Fragment, TokenEstimator};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BudgetOutcome {
    pub related: Vec<Entity>,
    /// Estimated cost of each surviving related entity, in order.
    pub related_tokens: Vec<usize>,
    pub primary_tokens: usize,
    /// Surviving chunks with `token_count` filled in.
    pub chunks: Vec<RetrievedChunk>,
    pub truncation_info: TruncationInfo,
    /// Estimated tokens of everything that survived.
    pub used_tokens: usize,
    /// Tokens available after the wrapper overhead.
    pub available_tokens: usize,
    /// The primary entity alone does not fit.
    pub primary_over_budget: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Related(usize),
    Chunk(usize),
}

pub struct TokenBudgeter {
    estimator: Arc<dyn TokenEstimator>,
    overhead: usize,
    linked_policy: LinkedEvictionPolicy,
}

impl TokenBudgeter {
    pub fn new(estimator: Arc<dyn TokenEstimator>, config: &BudgetConfig) -> Self {
        Self {
            estimator,
            overhead: config.wrapper_overhead,
            linked_policy: config.linked_eviction,
        }
    }

    pub fn overhead(&self) -> usize {
        self.overhead
    }

    pub fn apply(
        &self,
        primary: Option<&Entity>,
        related: Vec<Entity>,
        chunks: Vec<RetrievedChunk>,
        linked_ids: &HashSet<String>,
        max_tokens: usize,
    ) -> BudgetOutcome {
        let available = max_tokens.saturating_sub(self.overhead);

        let primary_cost = primary
            .map(|p| self.estimator.estimate(&Fragment::Primary(p)))
            .unwrap_or(0);
        let related_costs: Vec<usize> = related
            .iter()
            .map(|e| self.estimator.estimate(&Fragment::Related(e)))
            .collect();
        let chunk_costs: Vec<usize> = chunks
            .iter()
            .map(|c| self.estimator.estimate(&Fragment::Chunk(c)))
            .collect();

        let total_tokens =
            primary_cost + related_costs.iter().sum::<usize>() + chunk_costs.iter().sum::<usize>();
        let total_sources = usize::from(primary.is_some()) + related.len() + chunks.len();

        let mut used = total_tokens;
        let mut evicted: HashSet<Slot> = HashSet::new();
        let mut excluded_tokens = 0;

        if used > available {
            for slot in self.eviction_order(&related, &chunks, linked_ids) {
                if used <= available {
                    break;
                }
                let cost = match slot {
                    Slot::Related(i) => related_costs[i],
                    Slot::Chunk(i) => chunk_costs[i],
                };
                used -= cost;
                excluded_tokens += cost;
                evicted.insert(slot);
            }
        }

        let excluded_sources = evicted.len();
        let primary_over_budget = primary_cost > available;

        let (related, related_tokens): (Vec<Entity>, Vec<usize>) = related
            .into_iter()
            .zip(related_costs)
            .enumerate()
            .filter(|(i, _)| !evicted.contains(&Slot::Related(*i)))
            .map(|(_, pair)| pair)
            .unzip();
        let chunks: Vec<RetrievedChunk> = chunks
            .into_iter()
            .zip(chunk_costs)
            .enumerate()
            .filter(|(i, _)| !evicted.contains(&Slot::Chunk(*i)))
            .map(|(_, (mut c, cost))| {
                c.token_count = cost;
                c
            })
            .collect();

        let truncation_percentage = if total_tokens == 0 {
            0.0
        } else {
            excluded_tokens as f32 / total_tokens as f32 * 100.0
        };

        if excluded_sources > 0 || primary_over_budget {
            debug!(
                max_tokens,
                available,
                total_tokens,
                used,
                excluded_sources,
                excluded_tokens,
                primary_over_budget,
                "Token budget enforced"
            );
        }

        BudgetOutcome {
            related,
            related_tokens,
            primary_tokens: primary_cost,
            chunks,
            truncation_info: TruncationInfo {
                truncated: excluded_sources > 0,
                total_sources,
                excluded_sources,
                excluded_tokens,
                truncation_percentage,
            },
            used_tokens: used,
            available_tokens: available,
            primary_over_budget,
        }
    }

    fn eviction_order(
        &self,
        related: &[Entity],
        chunks: &[RetrievedChunk],
        linked_ids: &HashSet<String>,
    ) -> Vec<Slot> {
        let lowest_first = |indices: &mut Vec<usize>| {
            indices.sort_by(|&a, &b| {
                chunks[a]
                    .relevance_score
                    .partial_cmp(&chunks[b].relevance_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.cmp(&a))
            });
        };

        let (mut linked, mut unlinked): (Vec<usize>, Vec<usize>) = (0..chunks.len())
            .partition(|&i| linked_ids.contains(&chunks[i].source_entity_id));
        lowest_first(&mut unlinked);
        lowest_first(&mut linked);

        let mut order: Vec<Slot> = unlinked.into_iter().map(Slot::Chunk).collect();
        if self.linked_policy == LinkedEvictionPolicy::Allow {
            order.extend(linked.into_iter().map(Slot::Chunk));
        }
        order.extend((0..related.len()).rev().map(Slot::Related));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_core::chunk::ChunkOrigin;
    use contextloom_core::token::HeuristicEstimator;
    use std::collections::HashMap;

    /// Fixed cost per source entity id.
    struct TableEstimator(HashMap<String, usize>);

    impl TableEstimator {
        fn new(costs: &[(&str, usize)]) -> Self {
            Self(costs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        }
    }

    impl TokenEstimator for TableEstimator {
        fn estimate(&self, fragment: &Fragment<'_>) -> usize {
            self.0.get(fragment.source_id()).copied().unwrap_or(0)
        }
    }

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

    fn budgeter(estimator: TableEstimator, policy: LinkedEvictionPolicy) -> TokenBudgeter {
        let config = BudgetConfig {
            linked_eviction: policy,
            ..BudgetConfig::default()
        };
        TokenBudgeter::new(Arc::new(estimator), &config)
    }

    fn scenario() -> (Entity, Vec<Entity>, Vec<RetrievedChunk>, TableEstimator) {
        let primary = Entity::new("proj-1", "project", "Apollo");
        let related = vec![Entity::new("note-1", "note", "Kickoff")];
        let chunks = vec![
            chunk("rag-doc", 0.9),
            chunk("rag-note", 0.8),
            chunk("rag-unlinked", 0.85),
        ];
        let estimator = TableEstimator::new(&[
            ("proj-1", 200),
            ("note-1", 120),
            ("rag-doc", 150),
            ("rag-note", 100),
            ("rag-unlinked", 90),
        ]);
        (primary, related, chunks, estimator)
    }

    #[test]
    fn evicts_unlinked_then_lowest_linked_and_keeps_related() {
        let (primary, related, chunks, estimator) = scenario();
        let budgeter = budgeter(estimator, LinkedEvictionPolicy::Allow);
        let linked_ids = linked(&["proj-1", "note-1", "rag-doc", "rag-note"]);

        let outcome = budgeter.apply(Some(&primary), related, chunks, &linked_ids, 600);
        assert_eq!(outcome.available_tokens, 500);
        let ids: Vec<&str> = outcome.chunks.iter().map(|c| c.source_entity_id.as_str()).collect();
        assert_eq!(ids, vec!["rag-doc"]);
        assert_eq!(outcome.related.len(), 1);
        assert_eq!(outcome.used_tokens, 470);

        let info = outcome.truncation_info;
        assert!(info.truncated);
        assert_eq!(info.total_sources, 5);
        assert_eq!(info.excluded_sources, 2);
        assert_eq!(info.excluded_tokens, 190);
        assert!((info.truncation_percentage - 190.0 / 660.0 * 100.0).abs() < 1e-3);
        assert!(!outcome.primary_over_budget);
    }

    #[test]
    fn protect_policy_evicts_related_before_linked_chunks() {
        let (primary, related, chunks, estimator) = scenario();
        let budgeter = budgeter(estimator, LinkedEvictionPolicy::Protect);
        let linked_ids = linked(&["proj-1", "note-1", "rag-doc", "rag-note"]);

        let outcome = budgeter.apply(Some(&primary), related, chunks, &linked_ids, 600);
        assert!(outcome.related.is_empty());
        assert_eq!(outcome.chunks.len(), 2);
        assert_eq!(outcome.used_tokens, 450);
    }

    #[test]
    fn within_budget_is_untouched_and_idempotent() {
        let (primary, related, chunks, estimator) = scenario();
        let budgeter = budgeter(estimator, LinkedEvictionPolicy::Allow);
        let linked_ids = linked(&["note-1"]);

        let first = budgeter.apply(Some(&primary), related, chunks, &linked_ids, 600);
        let second = budgeter.apply(
            Some(&primary),
            first.related.clone(),
            first.chunks.clone(),
            &linked_ids,
            600,
        );
        assert!(!second.truncation_info.truncated);
        assert_eq!(second.chunks, first.chunks);
        assert_eq!(second.related.len(), first.related.len());

        let roomy = budgeter.apply(Some(&primary), second.related, second.chunks, &linked_ids, 10_000);
        assert!(!roomy.truncation_info.truncated);
        assert_eq!(roomy.truncation_info.excluded_tokens, 0);
    }

    #[test]
    fn primary_is_never_evicted() {
        let (primary, related, chunks, estimator) = scenario();
        let budgeter = budgeter(estimator, LinkedEvictionPolicy::Allow);

        let outcome = budgeter.apply(Some(&primary), related, chunks, &HashSet::new(), 250);
        assert!(outcome.chunks.is_empty());
        assert!(outcome.related.is_empty());
        assert_eq!(outcome.used_tokens, 200);
        assert!(outcome.primary_over_budget);
        assert_eq!(outcome.truncation_info.excluded_sources, 4);
    }

    #[test]
    fn equal_scores_evict_later_chunk_first() {
        let estimator = TableEstimator::new(&[("a", 50), ("b", 50)]);
        let budgeter = budgeter(estimator, LinkedEvictionPolicy::Allow);
        let outcome = budgeter.apply(
            None,
            Vec::new(),
            vec![chunk("a", 0.5), chunk("b", 0.5)],
            &HashSet::new(),
            160,
        );
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].source_entity_id, "a");
    }

    #[test]
    fn survivors_carry_token_counts() {
        let budgeter = TokenBudgeter::new(Arc::new(HeuristicEstimator), &BudgetConfig::default());
        let outcome = budgeter.apply(None, Vec::new(), vec![chunk("a", 0.5)], &HashSet::new(), 4096);
        assert!(outcome.chunks[0].token_count > 0);
        assert_eq!(outcome.used_tokens, outcome.chunks[0].token_count);
    }
}
