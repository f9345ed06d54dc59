//! Context assembler — the orchestration root.
//!
//! One request runs these stages:
//!
//! 1. Resolve the primary entity (absent ⇒ identifier `""`).
//! 2. Resolve related entities and access-filter them.
//! 3. Retrieve candidate chunks, consulting the cache first for global
//!    scope. Runs concurrently with stage 2.
//! 4. Rank; graph-filter in project scope.
//! 5. Access-filter the surviving chunks.
//! 6. Apply the token budget.
//! 7. Run the quality gate.
//! 8. Format the final text.
//!
//! Only malformed input is rejected ([`AssemblyError`]). Every collaborator
//! failure degrades its own stage and is reported through `warnings`,
//! `metadata`, and the observability sink.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use contextloom_config::{EngineConfig, RankingConfig, RetrievalConfig};
use contextloom_core::access::AccessControl;
use contextloom_core::cache::KeyValueCache;
use contextloom_core::chunk::{RetrievedChunk, SearchBackend};
use contextloom_core::context::{
    AssembledContext, AssemblyMetadata, CacheStatus, EntityRef, RetrievalMethod, Severity,
    Warning, WarningKind,
};
use contextloom_core::entity::{Entity, EntityStore};
use contextloom_core::error::AssemblyError;
use contextloom_core::events::{self, operations};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};
use contextloom_core::quality::{QualityAssessor, QualityCandidate};
use contextloom_core::query::{Intent, Query, ScopeMode};
use contextloom_core::token::{HeuristicEstimator, TokenEstimator};
use contextloom_security::{AccessFilter, AuditLogger, FilterStage};
use contextloom_telemetry::TracingSink;
use tracing::{debug, info, warn};

use crate::budget::TokenBudgeter;
use crate::cache::CacheManager;
use crate::format::format_context;
use crate::gateway::EntityGateway;
use crate::quality::QualityGate;
use crate::ranking::{graph_filter, rank_by_score};
use crate::relationships::RelationshipResolver;
use crate::retrieval::RetrievalGateway;

// ── Request ───────────────────────────────────────────────────────────────

/// Everything one assembly call needs.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub tenant_id: String,
    pub user_id: String,
    pub query: Query,
    pub intent: Intent,
}

impl AssemblyRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        query: Query,
        intent: Intent,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            query,
            intent,
        }
    }
}

// ── Stage results ─────────────────────────────────────────────────────────

struct RelatedStage {
    entities: Vec<Entity>,
    denied_ids: Vec<String>,
    denied_count: usize,
    access_errors: usize,
    lookup_failed: bool,
}

struct RetrievalStage {
    chunks: Vec<RetrievedChunk>,
    method: RetrievalMethod,
    fallback_used: bool,
    cache_status: CacheStatus,
    degraded: Vec<&'static str>,
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Wires collaborators into a [`ContextAssembler`]. Only the entity store
/// is required; every other capability may be absent.
pub struct ContextAssemblerBuilder {
    entity_store: Arc<dyn EntityStore>,
    semantic: Option<Arc<dyn SearchBackend>>,
    keyword: Option<Arc<dyn SearchBackend>>,
    access: Option<Arc<dyn AccessControl>>,
    quality: Option<Arc<dyn QualityAssessor>>,
    cache: Option<Arc<dyn KeyValueCache>>,
    estimator: Arc<dyn TokenEstimator>,
    sink: Arc<dyn ObservabilitySink>,
    audit: Option<Arc<AuditLogger>>,
    config: EngineConfig,
}

impl ContextAssemblerBuilder {
    pub fn semantic_search(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.semantic = Some(backend);
        self
    }

    pub fn keyword_search(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.keyword = Some(backend);
        self
    }

    pub fn access_control(mut self, acl: Arc<dyn AccessControl>) -> Self {
        self.access = Some(acl);
        self
    }

    pub fn quality_assessor(mut self, assessor: Arc<dyn QualityAssessor>) -> Self {
        self.quality = Some(assessor);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn token_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ContextAssembler {
        let config = self.config;
        let sink = self.sink;

        let gateway = Arc::new(EntityGateway::new(self.entity_store, &config.entity_store));
        let mut access = AccessFilter::new(self.access, &config.access, sink.clone());
        if let Some(audit) = self.audit {
            access = access.with_audit(audit);
        }

        debug!(
            store = %gateway.store_name(),
            semantic = self.semantic.is_some(),
            keyword = self.keyword.is_some(),
            access = access.is_enabled(),
            quality = self.quality.is_some(),
            cache = self.cache.is_some(),
            "Context assembler built"
        );

        ContextAssembler {
            resolver: RelationshipResolver::new(gateway.clone(), sink.clone()),
            gateway,
            retrieval: RetrievalGateway::new(self.semantic, self.keyword, &config.retrieval, sink.clone()),
            access,
            budgeter: TokenBudgeter::new(self.estimator, &config.budget),
            quality: QualityGate::new(self.quality, config.quality.clone(), sink.clone()),
            cache: CacheManager::new(self.cache, config.cache.clone(), sink.clone()),
            retrieval_config: config.retrieval,
            ranking: config.ranking,
            default_max_tokens: config.budget.default_max_tokens,
            sink,
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    gateway: Arc<EntityGateway>,
    resolver: RelationshipResolver,
    retrieval: RetrievalGateway,
    access: AccessFilter,
    budgeter: TokenBudgeter,
    quality: QualityGate,
    cache: CacheManager,
    retrieval_config: RetrievalConfig,
    ranking: RankingConfig,
    default_max_tokens: usize,
    sink: Arc<dyn ObservabilitySink>,
}

impl ContextAssembler {
    pub fn builder(entity_store: Arc<dyn EntityStore>) -> ContextAssemblerBuilder {
        ContextAssemblerBuilder {
            entity_store,
            semantic: None,
            keyword: None,
            access: None,
            quality: None,
            cache: None,
            estimator: Arc::new(HeuristicEstimator),
            sink: Arc::new(TracingSink),
            audit: None,
            config: EngineConfig::default(),
        }
    }

    pub async fn assemble(&self, request: &AssemblyRequest) -> Result<AssembledContext, AssemblyError> {
        let started = Instant::now();
        let max_tokens = self.validate(request)?;
        let tenant_id = request.tenant_id.as_str();
        let scope = request.query.scope_mode;
        let mut metadata = AssemblyMetadata::new(scope);

        // 1. Primary entity
        let primary = self.resolve_primary(tenant_id, &request.query, &mut metadata).await;

        // 2–3. Related entities and retrieval are independent.
        let (related, retrieved) = tokio::join!(
            self.related_stage(request, primary.as_ref()),
            self.retrieval_stage(request),
        );

        if related.lookup_failed {
            metadata.mark_degraded("entity_store");
        }
        for backend in &retrieved.degraded {
            metadata.mark_degraded(backend);
        }
        metadata.retrieval_method = retrieved.method;
        metadata.fallback_used = retrieved.fallback_used;
        metadata.cache_status = retrieved.cache_status;
        if retrieved.cache_status == CacheStatus::Error {
            metadata.mark_degraded("cache");
        }

        let linked_ids: HashSet<String> = primary
            .iter()
            .chain(related.entities.iter())
            .map(|e| e.id.clone())
            .collect();

        // 4. Rank
        let ranked = match (&primary, scope) {
            (Some(primary), ScopeMode::Project) => {
                let outcome = graph_filter(retrieved.chunks, &linked_ids, &self.ranking);
                self.sink.track_event(
                    events::GRAPH_FILTER_APPLIED,
                    serde_json::json!({
                        "tenant_id": tenant_id,
                        "primary_id": primary.id,
                        "linked": outcome.linked,
                        "unlinked_total": outcome.unlinked_total,
                        "unlinked_kept": outcome.unlinked_kept,
                    }),
                );
                outcome.chunks
            }
            _ => rank_by_score(retrieved.chunks),
        };

        // 5. Access-filter chunks
        let chunk_filter = self
            .access
            .filter(tenant_id, &request.user_id, FilterStage::Chunks, ranked)
            .await;
        let access_errors = related.access_errors + chunk_filter.errored_ids.len();
        if access_errors > 0 {
            metadata.mark_degraded("access_control");
        }
        metadata.access_errors = access_errors;
        metadata.denied_count = related.denied_count + chunk_filter.denied_count;

        let mut warnings = Vec::new();
        let mut denied_ids = related.denied_ids;
        denied_ids.extend(chunk_filter.denied_ids.iter().cloned());
        if metadata.denied_count > 0 {
            warnings.push(
                Warning::new(
                    WarningKind::PermissionFiltered,
                    Severity::Info,
                    format!(
                        "{} fragment(s) removed by access control",
                        metadata.denied_count
                    ),
                )
                .with_details(serde_json::json!({
                    "denied_ids": denied_ids,
                    "related_denied": related.denied_count,
                    "chunks_denied": chunk_filter.denied_count,
                })),
            );
        }

        // 6. Budget
        let budget = self.budgeter.apply(
            primary.as_ref(),
            related.entities,
            chunk_filter.allowed,
            &linked_ids,
            max_tokens,
        );
        let truncation = budget.truncation_info;
        if truncation.truncated || budget.primary_over_budget {
            self.sink.track_event(
                events::CONTEXT_TRUNCATED,
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "max_tokens": max_tokens,
                    "excluded_sources": truncation.excluded_sources,
                    "excluded_tokens": truncation.excluded_tokens,
                    "truncation_percentage": truncation.truncation_percentage,
                    "primary_over_budget": budget.primary_over_budget,
                }),
            );
            let message = if budget.primary_over_budget {
                format!(
                    "Primary entity alone exceeds the {} token budget; {} other source(s) excluded",
                    budget.available_tokens, truncation.excluded_sources
                )
            } else {
                format!(
                    "{} of {} source(s) excluded to fit the token budget",
                    truncation.excluded_sources, truncation.total_sources
                )
            };
            warnings.push(
                Warning::new(WarningKind::Truncation, Severity::Info, message)
                    .with_details(serde_json::to_value(truncation).unwrap_or_default())
                    .with_suggestion("Raise the token budget or narrow the scope"),
            );
        }

        // 7. Quality gate
        let candidates = quality_candidates(primary.as_ref(), &budget);
        let verdict = self.quality.assess(tenant_id, &request.intent, &candidates).await;
        if verdict.degraded {
            metadata.mark_degraded("quality_assessor");
        }
        warnings.extend(verdict.warnings);
        metadata.insufficient_context = verdict.insufficient;

        // 8. Format
        let formatted_text = format_context(primary.as_ref(), &budget.related, &budget.chunks);

        metadata.duration_ms = started.elapsed().as_millis() as u64;
        let warning_kinds: Vec<String> = warnings.iter().map(|w| w.kind.to_string()).collect();
        self.sink.track_event(
            events::CONTEXT_ASSEMBLED,
            serde_json::json!({
                "tenant_id": tenant_id,
                "scope": scope.to_string(),
                "retrieval_method": metadata.retrieval_method,
                "cache_status": metadata.cache_status,
                "related": budget.related.len(),
                "chunks": budget.chunks.len(),
                "warnings": warning_kinds,
                "degraded": metadata.degraded,
                "duration_ms": metadata.duration_ms,
            }),
        );
        info!(
            tenant_id = %tenant_id,
            scope = %scope,
            related = budget.related.len(),
            chunks = budget.chunks.len(),
            tokens = budget.used_tokens,
            warnings = warnings.len(),
            degraded = ?metadata.degraded,
            duration_ms = metadata.duration_ms,
            "Context assembled"
        );

        Ok(AssembledContext {
            primary_entity: primary.as_ref().map(EntityRef::from).unwrap_or_else(EntityRef::absent),
            related_entities: budget.related.iter().map(EntityRef::from).collect(),
            rag_chunks: budget.chunks,
            formatted_text,
            quality_metrics: verdict.metrics,
            truncation_info: Some(truncation),
            warnings,
            metadata,
        })
    }

    /// Reject malformed input; returns the effective token budget.
    fn validate(&self, request: &AssemblyRequest) -> Result<usize, AssemblyError> {
        if request.tenant_id.trim().is_empty() {
            return Err(AssemblyError::MissingTenant);
        }
        if request.user_id.trim().is_empty() {
            return Err(AssemblyError::MissingUser);
        }
        let query = &request.query;
        let has_entity = query
            .scope_entity_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if query.scope_mode.requires_entity() && !has_entity {
            return Err(AssemblyError::MissingScopeEntity {
                scope: query.scope_mode.to_string(),
            });
        }
        let max_tokens = if query.token_budget == 0 {
            self.default_max_tokens
        } else {
            query.token_budget
        };
        if max_tokens <= self.budgeter.overhead() {
            return Err(AssemblyError::InvalidBudget {
                budget: max_tokens,
                overhead: self.budgeter.overhead(),
            });
        }
        Ok(max_tokens)
    }

    async fn resolve_primary(
        &self,
        tenant_id: &str,
        query: &Query,
        metadata: &mut AssemblyMetadata,
    ) -> Option<Entity> {
        let id = query.scope_entity_id.as_deref().filter(|id| !id.trim().is_empty())?;
        match self.gateway.get_entity(tenant_id, id).await {
            Ok(Some(entity)) => Some(entity),
            Ok(None) => {
                debug!(entity_id = %id, "Primary entity not found");
                self.sink.track_event(
                    events::PRIMARY_ENTITY_MISSING,
                    serde_json::json!({ "tenant_id": tenant_id, "entity_id": id }),
                );
                None
            }
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Primary entity lookup failed");
                self.sink.track_exception(
                    &e,
                    ExceptionContext::new(operations::GET_ENTITY, tenant_id).for_entity(id),
                );
                self.sink.track_event(
                    events::ENTITY_LOOKUP_FAILED,
                    serde_json::json!({ "tenant_id": tenant_id, "entity_id": id }),
                );
                metadata.mark_degraded("entity_store");
                None
            }
        }
    }

    async fn related_stage(&self, request: &AssemblyRequest, primary: Option<&Entity>) -> RelatedStage {
        let resolved = self.resolver.resolve(&request.tenant_id, primary).await;
        let lookup_failed = !resolved.failed.is_empty();
        let filtered = self
            .access
            .filter(
                &request.tenant_id,
                &request.user_id,
                FilterStage::RelatedEntities,
                resolved.entities,
            )
            .await;
        RelatedStage {
            entities: filtered.allowed,
            denied_ids: filtered.denied_ids,
            denied_count: filtered.denied_count,
            access_errors: filtered.errored_ids.len(),
            lookup_failed,
        }
    }

    async fn retrieval_stage(&self, request: &AssemblyRequest) -> RetrievalStage {
        let tenant_id = request.tenant_id.as_str();
        let query = &request.query;
        let params = self.retrieval_config.params_for(query.scope_mode);

        let cacheable = query.scope_mode.is_cacheable();
        let mut cache_status = if !cacheable {
            CacheStatus::NotApplicable
        } else if !self.cache.is_enabled() {
            CacheStatus::Disabled
        } else {
            CacheStatus::Miss
        };

        let mut cache_key = None;
        if cache_status == CacheStatus::Miss {
            let key = self.cache.key_for(tenant_id, &query.text, params);
            let lookup = self.cache.read(tenant_id, &key).await;
            cache_status = lookup.status;
            if let Some(chunks) = lookup.chunks {
                return RetrievalStage {
                    chunks,
                    method: RetrievalMethod::Cache,
                    fallback_used: false,
                    cache_status,
                    degraded: Vec::new(),
                };
            }
            cache_key = Some(key);
        }

        let outcome = self.retrieval.retrieve(tenant_id, &query.text, params).await;

        // Only clean, non-empty results are cached.
        if let Some(key) = cache_key {
            if !outcome.is_degraded()
                && !outcome.chunks.is_empty()
                && !self.cache.write(tenant_id, &key, &outcome.chunks).await
            {
                cache_status = CacheStatus::Error;
            }
        }

        RetrievalStage {
            chunks: outcome.chunks,
            method: outcome.method,
            fallback_used: outcome.fallback_used,
            cache_status,
            degraded: outcome.degraded,
        }
    }
}

fn quality_candidates(primary: Option<&Entity>, budget: &crate::budget::BudgetOutcome) -> Vec<QualityCandidate> {
    let entities = primary
        .map(|p| (p, budget.primary_tokens))
        .into_iter()
        .chain(budget.related.iter().zip(budget.related_tokens.iter().copied()))
        .map(|(entity, tokens)| QualityCandidate {
            source_entity_id: entity.id.clone(),
            relevance: None,
            token_count: tokens,
        });
    let chunks = budget.chunks.iter().map(|c| QualityCandidate {
        source_entity_id: c.source_entity_id.clone(),
        relevance: Some(c.relevance_score),
        token_count: c.token_count,
    });
    entities.chain(chunks).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_core::chunk::SearchHit;
    use contextloom_core::quality::QualityRequirement;
    use contextloom_stores::{
        BasicQualityAssessor, InMemoryCache, InMemoryEntityStore, StaticAccessControl,
        StaticSearch,
    };
    use contextloom_telemetry::TelemetryEngine;

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            entity_id: id.into(),
            entity_type_id: "document".into(),
            content: format!("Notes from {id}"),
            score,
            chunk_index: Some(0),
            highlight: None,
        }
    }

    async fn store() -> Arc<InMemoryEntityStore> {
        let store = Arc::new(InMemoryEntityStore::new());
        store
            .insert(
                "t1",
                Entity::new("proj-1", "project", "Apollo")
                    .with_field("status", serde_json::json!("active"))
                    .link_to("doc-1", "document")
                    .link_to("note-1", "note"),
            )
            .await;
        store.insert("t1", Entity::new("doc-1", "document", "Budget plan")).await;
        store.insert("t1", Entity::new("note-1", "note", "Kickoff notes")).await;
        store
    }

    fn request(query: Query, intent: &str) -> AssemblyRequest {
        AssemblyRequest::new("t1", "u1", query, Intent::new(intent, 0.9))
    }

    #[tokio::test]
    async fn rejects_malformed_input() {
        let assembler = ContextAssembler::builder(store().await).build();

        let mut req = request(Query::new("q", 1000), "search");
        req.tenant_id = "  ".into();
        assert_eq!(assembler.assemble(&req).await.unwrap_err(), AssemblyError::MissingTenant);

        let mut req = request(Query::new("q", 1000), "search");
        req.user_id = String::new();
        assert_eq!(assembler.assemble(&req).await.unwrap_err(), AssemblyError::MissingUser);

        let req = request(Query::new("q", 1000).scoped(ScopeMode::Project, None), "search");
        assert_eq!(
            assembler.assemble(&req).await.unwrap_err(),
            AssemblyError::MissingScopeEntity {
                scope: "project".into()
            }
        );

        let req = request(Query::new("q", 80), "search");
        assert!(matches!(
            assembler.assemble(&req).await.unwrap_err(),
            AssemblyError::InvalidBudget { budget: 80, .. }
        ));
    }

    #[tokio::test]
    async fn zero_budget_uses_configured_default() {
        let assembler = ContextAssembler::builder(store().await).build();
        let ctx = assembler.assemble(&request(Query::new("q", 0), "search")).await.unwrap();
        assert!(!ctx.truncation_info.unwrap().truncated);
    }

    #[tokio::test]
    async fn project_scope_combines_graph_and_retrieval() {
        let telemetry = Arc::new(TelemetryEngine::new());
        let semantic = Arc::new(StaticSearch::new(
            "vector",
            vec![hit("doc-1", 0.92), hit("u1", 0.9), hit("note-1", 0.88), hit("u2", 0.7), hit("u3", 0.4)],
        ));
        let assembler = ContextAssembler::builder(store().await)
            .semantic_search(semantic)
            .sink(telemetry.clone())
            .build();

        let query = Query::new("apollo budget", 4000).scoped(ScopeMode::Project, Some("proj-1".into()));
        let ctx = assembler.assemble(&request(query, "analysis")).await.unwrap();

        assert_eq!(ctx.primary_entity.identifier, "proj-1");
        let related: Vec<&str> = ctx.related_entities.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(related, vec!["doc-1", "note-1"]);
        let chunks: Vec<&str> = ctx.rag_chunks.iter().map(|c| c.source_entity_id.as_str()).collect();
        assert_eq!(chunks, vec!["doc-1", "u1", "note-1"]);
        assert!(ctx.formatted_text.contains("[Primary Entity]"));
        assert_eq!(ctx.metadata.retrieval_method, RetrievalMethod::Vector);
        assert_eq!(ctx.metadata.cache_status, CacheStatus::NotApplicable);
        assert!(telemetry.has_event(events::GRAPH_FILTER_APPLIED));
        assert!(telemetry.has_event(events::CONTEXT_ASSEMBLED));
    }

    #[tokio::test]
    async fn missing_primary_yields_empty_context() {
        let telemetry = Arc::new(TelemetryEngine::new());
        let mut config = EngineConfig::default();
        config.quality.requirements.insert(
            "analysis".into(),
            QualityRequirement {
                allow_empty: false,
                min_source_count: 3,
                min_relevance_score: 0.0,
                min_tokens: None,
            },
        );
        let assembler = ContextAssembler::builder(Arc::new(InMemoryEntityStore::new()))
            .semantic_search(Arc::new(StaticSearch::new("vector", Vec::new())))
            .quality_assessor(Arc::new(BasicQualityAssessor::new(config.quality.clone())))
            .sink(telemetry.clone())
            .config(config)
            .build();

        let query = Query::new("anything", 1000).scoped(ScopeMode::Entity, Some("gone".into()));
        let ctx = assembler.assemble(&request(query, "analysis")).await.unwrap();

        assert_eq!(ctx.primary_entity.identifier, "");
        assert!(ctx.related_entities.is_empty());
        assert!(ctx.rag_chunks.is_empty());
        assert_eq!(ctx.formatted_text, "");
        let metrics = ctx.quality_metrics.as_ref().unwrap();
        assert_eq!(metrics.source_count, 0);
        assert!(!metrics.meets_minimum_requirements);
        assert!(ctx.has_warning(WarningKind::EmptyContext));
        assert_eq!(ctx.metadata.insufficient_context.as_ref().unwrap().min_required, 3);
        assert!(telemetry.has_event(events::PRIMARY_ENTITY_MISSING));
    }

    #[tokio::test]
    async fn denied_related_entity_never_leaks() {
        let telemetry = Arc::new(TelemetryEngine::new());
        let acl = Arc::new(StaticAccessControl::new());
        acl.deny("note-1").await;
        let assembler = ContextAssembler::builder(store().await)
            .access_control(acl)
            .sink(telemetry.clone())
            .build();

        let query = Query::new("q", 2000).scoped(ScopeMode::Entity, Some("proj-1".into()));
        let ctx = assembler.assemble(&request(query, "summary")).await.unwrap();

        assert!(ctx.related_entities.iter().all(|r| r.identifier != "note-1"));
        assert!(!ctx.formatted_text.contains("Kickoff notes"));
        assert!(ctx.has_warning(WarningKind::PermissionFiltered));
        assert_eq!(ctx.metadata.denied_count, 1);
        let denied = telemetry.events_named(events::PERMISSION_FILTERED);
        assert_eq!(denied[0].prop_str("entity_id"), Some("note-1"));
    }

    #[tokio::test]
    async fn global_scope_is_served_from_cache_on_second_call() {
        let cache = Arc::new(InMemoryCache::new());
        let semantic = Arc::new(StaticSearch::new("vector", vec![hit("doc-1", 0.9)]));
        let assembler = ContextAssembler::builder(store().await)
            .semantic_search(semantic.clone())
            .cache(cache.clone())
            .sink(Arc::new(TelemetryEngine::new()))
            .build();

        let query = Query::new("budget", 2000).scoped(ScopeMode::Global, None);
        let first = assembler.assemble(&request(query.clone(), "search")).await.unwrap();
        assert_eq!(first.metadata.cache_status, CacheStatus::Miss);
        assert_eq!(cache.len().await, 1);

        let second = assembler.assemble(&request(query, "search")).await.unwrap();
        assert_eq!(second.metadata.cache_status, CacheStatus::Hit);
        assert_eq!(second.metadata.retrieval_method, RetrievalMethod::Cache);
        assert_eq!(second.rag_chunks.len(), 1);
        assert_eq!(semantic.call_count(), 1);
    }

    #[tokio::test]
    async fn store_failure_degrades_without_failing() {
        let store = store().await;
        store.mark_unavailable("proj-1").await;
        let telemetry = Arc::new(TelemetryEngine::new());
        let assembler = ContextAssembler::builder(store).sink(telemetry.clone()).build();

        let query = Query::new("q", 2000).scoped(ScopeMode::Entity, Some("proj-1".into()));
        let ctx = assembler.assemble(&request(query, "search")).await.unwrap();
        assert!(ctx.primary_entity.is_absent());
        assert_eq!(ctx.metadata.degraded, vec!["entity_store"]);
        assert_eq!(telemetry.exceptions_for(operations::GET_ENTITY).len(), 1);
        assert!(telemetry.has_event(events::ENTITY_LOOKUP_FAILED));
    }
}
