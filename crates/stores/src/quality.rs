//! Threshold-based quality assessor.

use async_trait::async_trait;
use contextloom_config::QualityConfig;
use contextloom_core::error::QualityError;
use contextloom_core::quality::{
    CandidateSummary, QualityAssessor, QualityCandidate, QualityMetrics, QualityRequirement,
};
use contextloom_core::query::Intent;

/// Scores a context as mean relevance, scaled down when fewer sources
/// than required are present. Requirements come from the intent table in
/// [`QualityConfig`].
pub struct BasicQualityAssessor {
    config: QualityConfig,
}

impl BasicQualityAssessor {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }
}

impl Default for BasicQualityAssessor {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

#[async_trait]
impl QualityAssessor for BasicQualityAssessor {
    fn name(&self) -> &str {
        "basic"
    }

    async fn assess(
        &self,
        candidates: &[QualityCandidate],
        requirement: &QualityRequirement,
    ) -> Result<QualityMetrics, QualityError> {
        let summary = CandidateSummary::of(candidates);
        let coverage = if requirement.min_source_count == 0 {
            1.0
        } else {
            (summary.source_count as f32 / requirement.min_source_count as f32).min(1.0)
        };
        // Unscored contexts (graph only) are judged on coverage alone.
        let relevance = if summary.scored_count == 0 {
            if summary.source_count > 0 { 1.0 } else { 0.0 }
        } else {
            summary.average_relevance
        };

        Ok(QualityMetrics {
            quality_score: relevance * coverage,
            source_count: summary.source_count,
            average_relevance: summary.average_relevance,
            total_tokens: summary.total_tokens,
            meets_minimum_requirements: requirement.shortfalls(&summary).is_empty(),
            minimum_requirements: requirement.clone(),
        })
    }

    async fn minimum_requirements(&self, intent: &Intent) -> Result<QualityRequirement, QualityError> {
        Ok(self.config.requirement_for(intent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, relevance: f32) -> QualityCandidate {
        QualityCandidate {
            source_entity_id: source.into(),
            relevance: Some(relevance),
            token_count: 20,
        }
    }

    #[tokio::test]
    async fn full_coverage_scores_mean_relevance() {
        let assessor = BasicQualityAssessor::default();
        let metrics = assessor
            .assess(
                &[chunk("a", 0.8), chunk("b", 0.6)],
                &QualityRequirement::analytical(),
            )
            .await
            .unwrap();
        assert!((metrics.quality_score - 0.7).abs() < 1e-6);
        assert_eq!(metrics.source_count, 2);
        assert!(metrics.meets_minimum_requirements);
    }

    #[tokio::test]
    async fn missing_sources_lower_score_and_fail_requirements() {
        let assessor = BasicQualityAssessor::default();
        let metrics = assessor
            .assess(&[chunk("a", 0.8)], &QualityRequirement::analytical())
            .await
            .unwrap();
        assert!((metrics.quality_score - 0.4).abs() < 1e-6);
        assert!(!metrics.meets_minimum_requirements);
    }

    #[tokio::test]
    async fn empty_exploratory_context_meets_requirements() {
        let assessor = BasicQualityAssessor::default();
        let metrics = assessor
            .assess(&[], &QualityRequirement::exploratory())
            .await
            .unwrap();
        assert_eq!(metrics.quality_score, 0.0);
        assert!(metrics.meets_minimum_requirements);
    }

    #[tokio::test]
    async fn requirements_follow_intent_table() {
        let assessor = BasicQualityAssessor::default();
        let search = assessor
            .minimum_requirements(&Intent::new("search", 0.9))
            .await
            .unwrap();
        assert!(search.allow_empty);

        let analysis = assessor
            .minimum_requirements(&Intent::new("analysis", 0.9))
            .await
            .unwrap();
        assert!(!analysis.allow_empty);
        assert_eq!(analysis.min_source_count, 2);
    }
}
