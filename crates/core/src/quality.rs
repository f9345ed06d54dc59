//! Quality assessment — per-intent minimum requirements and the metrics
//! an assembled context is measured by.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QualityError;
use crate::query::Intent;

/// Minimum thresholds a context must clear to be considered usable.
///
/// Invariant: `allow_empty == false` implies `min_source_count >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRequirement {
    #[serde(default)]
    pub allow_empty: bool,
    #[serde(default = "default_min_source_count")]
    pub min_source_count: usize,
    #[serde(default)]
    pub min_relevance_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tokens: Option<usize>,
}

fn default_min_source_count() -> usize {
    1
}

impl QualityRequirement {
    /// Search-type intents: nothing found is an acceptable answer.
    pub fn exploratory() -> Self {
        Self {
            allow_empty: true,
            min_source_count: 0,
            min_relevance_score: 0.0,
            min_tokens: None,
        }
    }

    /// Analytical intents never accept an empty context.
    pub fn analytical() -> Self {
        Self {
            allow_empty: false,
            min_source_count: 2,
            min_relevance_score: 0.5,
            min_tokens: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.allow_empty && self.min_source_count == 0 {
            return Err("allow_empty = false requires min_source_count >= 1".into());
        }
        if !(0.0..=1.0).contains(&self.min_relevance_score) {
            return Err(format!(
                "min_relevance_score {} must be within [0, 1]",
                self.min_relevance_score
            ));
        }
        Ok(())
    }

    /// Every threshold the summary falls short of, as a stable reason tag.
    /// `allow_empty` does not waive `min_source_count`.
    pub fn shortfalls(&self, summary: &CandidateSummary) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if summary.source_count < self.min_source_count {
            reasons.push("source_count");
        }
        if summary.scored_count > 0 && summary.average_relevance < self.min_relevance_score {
            reasons.push("relevance");
        }
        if let Some(min_tokens) = self.min_tokens {
            if summary.total_tokens < min_tokens {
                reasons.push("tokens");
            }
        }
        reasons
    }
}

impl Default for QualityRequirement {
    fn default() -> Self {
        Self {
            allow_empty: false,
            min_source_count: 1,
            min_relevance_score: 0.0,
            min_tokens: None,
        }
    }
}

/// One fragment of the assembled context, as seen by the assessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCandidate {
    pub source_entity_id: String,
    /// `None` for graph entities, which carry no retrieval score.
    pub relevance: Option<f32>,
    pub token_count: usize,
}

/// Counts derived from a candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateSummary {
    /// Distinct source entities.
    pub source_count: usize,
    /// Candidates carrying a retrieval score.
    pub scored_count: usize,
    /// Mean retrieval score over scored candidates (0 when none).
    pub average_relevance: f32,
    pub total_tokens: usize,
}

impl CandidateSummary {
    pub fn of(candidates: &[QualityCandidate]) -> Self {
        let sources: HashSet<&str> = candidates
            .iter()
            .map(|c| c.source_entity_id.as_str())
            .collect();
        let scores: Vec<f32> = candidates.iter().filter_map(|c| c.relevance).collect();
        let average_relevance = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        };
        Self {
            source_count: sources.len(),
            scored_count: scores.len(),
            average_relevance,
            total_tokens: candidates.iter().map(|c| c.token_count).sum(),
        }
    }
}

/// The assessor's verdict on an assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub quality_score: f32,
    pub source_count: usize,
    pub average_relevance: f32,
    pub total_tokens: usize,
    pub meets_minimum_requirements: bool,
    pub minimum_requirements: QualityRequirement,
}

#[async_trait]
pub trait QualityAssessor: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(
        &self,
        candidates: &[QualityCandidate],
        requirement: &QualityRequirement,
    ) -> std::result::Result<QualityMetrics, QualityError>;

    async fn minimum_requirements(
        &self,
        intent: &Intent,
    ) -> std::result::Result<QualityRequirement, QualityError>;
}
