//! Access filter — per-fragment permission checks against the injected
//! [`AccessControl`] capability.
//!
//! Applied twice per request: to the related entities produced by the
//! relationship resolver, and to retrieved chunks. One check is issued per
//! distinct entity id and all checks fan out concurrently.
//!
//! When a check itself fails, the configured [`AccessFailurePolicy`]
//! decides: fail-open includes the fragment, fail-closed drops it. Either
//! way the failure is recorded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use contextloom_config::{AccessConfig, AccessFailurePolicy};
use contextloom_core::access::{AccessControl, AccessRequest};
use contextloom_core::chunk::RetrievedChunk;
use contextloom_core::entity::Entity;
use contextloom_core::error::AccessError;
use contextloom_core::events::{self, operations};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};
use futures::future::join_all;
use tracing::debug;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};

/// Anything that belongs to exactly one entity.
pub trait AccessSubject {
    fn subject_id(&self) -> &str;
}

impl AccessSubject for Entity {
    fn subject_id(&self) -> &str {
        &self.id
    }
}

impl AccessSubject for RetrievedChunk {
    fn subject_id(&self) -> &str {
        &self.source_entity_id
    }
}

/// Which pipeline stage a filter call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    RelatedEntities,
    Chunks,
}

impl FilterStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RelatedEntities => "related_entities",
            Self::Chunks => "chunks",
        }
    }
}

/// Result of one filter call.
#[derive(Debug, Clone)]
pub struct FilterOutcome<T> {
    pub allowed: Vec<T>,
    /// Distinct entity ids the ACL denied, in first-seen order.
    pub denied_ids: Vec<String>,
    /// Distinct entity ids whose check failed.
    pub errored_ids: Vec<String>,
    /// Fragments removed, by denial or by fail-closed.
    pub denied_count: usize,
}

impl<T> FilterOutcome<T> {
    fn pass_through(candidates: Vec<T>) -> Self {
        Self {
            allowed: candidates,
            denied_ids: Vec::new(),
            errored_ids: Vec::new(),
            denied_count: 0,
        }
    }
}

enum Verdict {
    Allow,
    Deny,
    Failed(AccessError),
}

pub struct AccessFilter {
    acl: Option<Arc<dyn AccessControl>>,
    policy: AccessFailurePolicy,
    required_permission: String,
    timeout: Duration,
    sink: Arc<dyn ObservabilitySink>,
    audit: Option<Arc<AuditLogger>>,
}

impl AccessFilter {
    /// Without an ACL capability every fragment passes.
    pub fn new(
        acl: Option<Arc<dyn AccessControl>>,
        config: &AccessConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            acl,
            policy: config.on_error,
            required_permission: config.required_permission.clone(),
            timeout: Duration::from_millis(config.call_timeout_ms),
            sink,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> AccessFailurePolicy {
        self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.acl.is_some()
    }

    /// Keep the candidates the user may read, preserving input order.
    pub async fn filter<T: AccessSubject>(
        &self,
        tenant_id: &str,
        user_id: &str,
        stage: FilterStage,
        candidates: Vec<T>,
    ) -> FilterOutcome<T> {
        let Some(acl) = &self.acl else {
            return FilterOutcome::pass_through(candidates);
        };
        if candidates.is_empty() {
            return FilterOutcome::pass_through(candidates);
        }

        let mut seen = HashSet::new();
        let ids: Vec<String> = candidates
            .iter()
            .map(|c| c.subject_id())
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect();

        let checks = ids
            .iter()
            .map(|id| self.check_one(acl.as_ref(), tenant_id, user_id, id));
        let verdicts: HashMap<String, Verdict> =
            ids.iter().cloned().zip(join_all(checks).await).collect();

        let mut denied_ids = Vec::new();
        let mut errored_ids = Vec::new();
        for id in &ids {
            match verdicts.get(id) {
                Some(Verdict::Deny) => {
                    let fragments = candidates.iter().filter(|c| c.subject_id() == id).count();
                    self.record_denial(tenant_id, user_id, stage, id, fragments);
                    denied_ids.push(id.clone());
                }
                Some(Verdict::Failed(err)) => {
                    self.record_failure(tenant_id, user_id, stage, id, err);
                    errored_ids.push(id.clone());
                }
                Some(Verdict::Allow) | None => {}
            }
        }

        let total = candidates.len();
        let allowed: Vec<T> = candidates
            .into_iter()
            .filter(|c| match verdicts.get(c.subject_id()) {
                Some(Verdict::Allow) | None => true,
                Some(Verdict::Deny) => false,
                Some(Verdict::Failed(_)) => self.policy == AccessFailurePolicy::FailOpen,
            })
            .collect();

        debug!(
            stage = stage.as_str(),
            checked = ids.len(),
            allowed = allowed.len(),
            denied = denied_ids.len(),
            errored = errored_ids.len(),
            "Access filter applied"
        );

        FilterOutcome {
            denied_count: total - allowed.len(),
            allowed,
            denied_ids,
            errored_ids,
        }
    }

    async fn check_one(
        &self,
        acl: &dyn AccessControl,
        tenant_id: &str,
        user_id: &str,
        entity_id: &str,
    ) -> Verdict {
        let request = AccessRequest {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            entity_id: entity_id.to_string(),
            required_permission: self.required_permission.clone(),
        };
        match tokio::time::timeout(self.timeout, acl.check_access(&request)).await {
            Ok(Ok(decision)) if decision.has_access => Verdict::Allow,
            Ok(Ok(_)) => Verdict::Deny,
            Ok(Err(e)) => Verdict::Failed(e),
            Err(_) => Verdict::Failed(AccessError::Timeout {
                entity_id: entity_id.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn record_denial(
        &self,
        tenant_id: &str,
        user_id: &str,
        stage: FilterStage,
        entity_id: &str,
        fragments: usize,
    ) {
        self.sink.track_event(
            events::PERMISSION_FILTERED,
            serde_json::json!({
                "entity_id": entity_id,
                "stage": stage.as_str(),
                "fragments": fragments,
                "tenant_id": tenant_id,
            }),
        );
        if let Some(audit) = &self.audit {
            let event = match stage {
                FilterStage::RelatedEntities => AuditEvent::RelatedEntityDenied,
                FilterStage::Chunks => AuditEvent::ChunkDenied {
                    chunk_count: fragments,
                },
            };
            audit.log(event, tenant_id, user_id, entity_id, AuditOutcome::Denied, None);
        }
    }

    fn record_failure(
        &self,
        tenant_id: &str,
        user_id: &str,
        stage: FilterStage,
        entity_id: &str,
        err: &AccessError,
    ) {
        let policy = match self.policy {
            AccessFailurePolicy::FailOpen => "fail_open",
            AccessFailurePolicy::FailClosed => "fail_closed",
        };
        self.sink.track_exception(
            err,
            ExceptionContext::new(operations::CHECK_ACCESS, tenant_id)
                .for_entity(entity_id)
                .with_details(serde_json::json!({"stage": stage.as_str(), "policy": policy})),
        );
        self.sink.track_event(
            events::ACCESS_CHECK_FAILED,
            serde_json::json!({
                "entity_id": entity_id,
                "stage": stage.as_str(),
                "policy": policy,
            }),
        );
        if let Some(audit) = &self.audit {
            let outcome = match self.policy {
                AccessFailurePolicy::FailOpen => AuditOutcome::FailedOpen,
                AccessFailurePolicy::FailClosed => AuditOutcome::FailedClosed,
            };
            audit.log(
                AuditEvent::AccessCheckFailed {
                    permission: self.required_permission.clone(),
                },
                tenant_id,
                user_id,
                entity_id,
                outcome,
                Some(err.to_string()),
            );
        }
    }
}
