//! Quality gate — compares the assembled set against the intent's minimum
//! requirements and derives warnings.
//!
//! Warnings are computed from the candidates themselves, so they are
//! produced even when the assessor is absent or fails. Only
//! `quality_metrics` depends on the assessor.

use std::sync::Arc;
use std::time::Duration;

use contextloom_config::QualityConfig;
use contextloom_core::context::{InsufficientContext, Severity, Warning, WarningKind};
use contextloom_core::error::QualityError;
use contextloom_core::events::{self, operations};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};
use contextloom_core::quality::{
    CandidateSummary, QualityAssessor, QualityCandidate, QualityMetrics, QualityRequirement,
};
use contextloom_core::query::Intent;
use tracing::{debug, warn};

/// Everything the gate concluded.
#[derive(Debug, Clone)]
pub struct QualityVerdict {
    /// `None` when no assessor is configured or it failed.
    pub metrics: Option<QualityMetrics>,
    pub requirement: QualityRequirement,
    pub summary: CandidateSummary,
    pub warnings: Vec<Warning>,
    pub insufficient: Option<InsufficientContext>,
    /// The assessor failed at least once during this gate.
    pub degraded: bool,
}

pub struct QualityGate {
    assessor: Option<Arc<dyn QualityAssessor>>,
    config: QualityConfig,
    timeout: Duration,
    sink: Arc<dyn ObservabilitySink>,
}

impl QualityGate {
    pub fn new(
        assessor: Option<Arc<dyn QualityAssessor>>,
        config: QualityConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        let timeout = Duration::from_millis(config.call_timeout_ms);
        Self {
            assessor,
            config,
            timeout,
            sink,
        }
    }

    pub async fn assess(
        &self,
        tenant_id: &str,
        intent: &Intent,
        candidates: &[QualityCandidate],
    ) -> QualityVerdict {
        let mut degraded = false;
        let requirement = match self.resolve_requirement(tenant_id, intent).await {
            Ok(requirement) => requirement,
            Err(()) => {
                degraded = true;
                self.config.requirement_for(intent)
            }
        };
        let summary = CandidateSummary::of(candidates);

        let metrics = match &self.assessor {
            None => None,
            Some(assessor) => {
                let call = assessor.assess(candidates, &requirement);
                let result = match tokio::time::timeout(self.timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(QualityError::AssessmentFailed(format!(
                        "assessor '{}' timed out after {}ms",
                        assessor.name(),
                        self.timeout.as_millis()
                    ))),
                };
                match result {
                    Ok(metrics) => Some(metrics),
                    Err(e) => {
                        degraded = true;
                        warn!(error = %e, "Quality assessment failed, continuing without metrics");
                        self.sink.track_exception(
                            &e,
                            ExceptionContext::new(operations::ASSESS_CONTEXT_QUALITY, tenant_id)
                                .with_details(serde_json::json!({
                                    "intent": intent.label,
                                    "candidates": candidates.len(),
                                })),
                        );
                        self.sink.track_event(
                            events::QUALITY_ASSESSMENT_FAILED,
                            serde_json::json!({
                                "tenant_id": tenant_id,
                                "intent": intent.label,
                            }),
                        );
                        None
                    }
                }
            }
        };

        let (warnings, insufficient) = self.derive_warnings(tenant_id, intent, &requirement, &summary);
        debug!(
            intent = %intent.label,
            sources = summary.source_count,
            average_relevance = summary.average_relevance,
            warnings = warnings.len(),
            assessed = metrics.is_some(),
            "Quality gate evaluated"
        );

        QualityVerdict {
            metrics,
            requirement,
            summary,
            warnings,
            insufficient,
            degraded,
        }
    }

    /// The assessor's requirement for this intent, or the configured one.
    /// `Err(())` means the assessor failed; the failure is already recorded.
    async fn resolve_requirement(&self, tenant_id: &str, intent: &Intent) -> Result<QualityRequirement, ()> {
        let Some(assessor) = &self.assessor else {
            return Ok(self.config.requirement_for(intent));
        };
        let result = match tokio::time::timeout(self.timeout, assessor.minimum_requirements(intent)).await {
            Ok(result) => result,
            Err(_) => Err(QualityError::AssessmentFailed(format!(
                "requirement lookup timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };
        match result {
            Ok(requirement) => Ok(requirement),
            Err(e) => {
                warn!(error = %e, intent = %intent.label, "Requirement lookup failed, using configured table");
                self.sink.track_exception(
                    &e,
                    ExceptionContext::new(operations::RESOLVE_REQUIREMENTS, tenant_id)
                        .with_details(serde_json::json!({ "intent": intent.label })),
                );
                Err(())
            }
        }
    }

    fn derive_warnings(
        &self,
        tenant_id: &str,
        intent: &Intent,
        requirement: &QualityRequirement,
        summary: &CandidateSummary,
    ) -> (Vec<Warning>, Option<InsufficientContext>) {
        let mut warnings = Vec::new();

        if summary.source_count == 0 && !requirement.allow_empty {
            self.sink.track_event(
                events::EMPTY_CONTEXT,
                serde_json::json!({ "tenant_id": tenant_id, "intent": intent.label }),
            );
            warnings.push(
                Warning::new(
                    WarningKind::EmptyContext,
                    Severity::Warning,
                    "No context could be assembled for this query",
                )
                .with_details(serde_json::json!({
                    "intent": intent.label,
                    "min_source_count": requirement.min_source_count,
                }))
                .with_suggestion("Broaden the query or check the scope entity"),
            );
        }

        let shortfalls = requirement.shortfalls(summary);
        let insufficient = if shortfalls.is_empty() {
            None
        } else {
            let signal = InsufficientContext {
                source_count: summary.source_count,
                min_required: requirement.min_source_count,
                reasons: shortfalls.iter().map(|r| r.to_string()).collect(),
            };
            self.sink.track_event(
                events::INSUFFICIENT_CONTEXT,
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "intent": intent.label,
                    "source_count": signal.source_count,
                    "min_required": signal.min_required,
                    "reasons": signal.reasons,
                }),
            );
            Some(signal)
        };

        let threshold = self.config.low_relevance_threshold;
        if summary.scored_count > 0 && summary.average_relevance < threshold {
            self.sink.track_event(
                events::LOW_RELEVANCE,
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "average_relevance": summary.average_relevance,
                    "threshold": threshold,
                }),
            );
            warnings.push(
                Warning::new(
                    WarningKind::LowRelevance,
                    Severity::Warning,
                    format!(
                        "Average relevance {:.2} is below {:.2}",
                        summary.average_relevance, threshold
                    ),
                )
                .with_details(serde_json::json!({
                    "average_relevance": summary.average_relevance,
                    "threshold": threshold,
                }))
                .with_suggestion("Rephrase the query with more specific terms"),
            );
        }

        (warnings, insufficient)
    }
}
