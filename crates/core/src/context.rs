//! The assembled context handed to the generation step, and the
//! diagnostics attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::RetrievedChunk;
use crate::entity::Entity;
use crate::quality::QualityMetrics;
use crate::query::ScopeMode;

/// A lightweight reference to an entity included in the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Empty string when there is no primary entity, never null.
    pub identifier: String,
    pub type_id: String,
    pub display_name: String,
}

impl EntityRef {
    /// The reference used when no primary entity resolved.
    pub fn absent() -> Self {
        Self {
            identifier: String::new(),
            type_id: String::new(),
            display_name: String::new(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.identifier.is_empty()
    }
}

impl From<&Entity> for EntityRef {
    fn from(entity: &Entity) -> Self {
        Self {
            identifier: entity.id.clone(),
            type_id: entity.type_id.clone(),
            display_name: entity.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    EmptyContext,
    PermissionFiltered,
    Truncation,
    LowRelevance,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContext => write!(f, "empty_context"),
            Self::PermissionFiltered => write!(f, "permission_filtered"),
            Self::Truncation => write!(f, "truncation"),
            Self::LowRelevance => write!(f, "low_relevance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// A quality or filtering shortfall attached to an otherwise successful
/// result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Warning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            details: serde_json::Value::Null,
            suggestion: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// What the token budgeter removed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruncationInfo {
    pub truncated: bool,
    pub total_sources: usize,
    pub excluded_sources: usize,
    pub excluded_tokens: usize,
    /// Share of estimated tokens excluded, 0.0–100.0.
    pub truncation_percentage: f32,
}

/// Which retrieval path supplied the chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Vector,
    KeywordFallback,
    /// Semantic results supplemented by keyword results.
    Hybrid,
    Cache,
    /// Nothing retrieved, or no search capability configured.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Scope is not cached.
    NotApplicable,
    /// No cache client configured, or caching switched off.
    Disabled,
    Hit,
    Miss,
    /// Entry found but older than the staleness threshold; deleted.
    Stale,
    /// Transport failure or corrupt payload; treated as a miss.
    Error,
}

/// The insufficient-context signal: the context cleared fewer sources (or
/// less relevance/tokens) than the intent requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientContext {
    pub source_count: usize,
    pub min_required: usize,
    pub reasons: Vec<String>,
}

/// Which collaborators degraded and how the context was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub scope: ScopeMode,
    pub retrieval_method: RetrievalMethod,
    pub fallback_used: bool,
    pub cache_status: CacheStatus,
    /// Collaborators that failed or were skipped during this request.
    pub degraded: Vec<String>,
    pub denied_count: usize,
    /// Access checks that threw and were resolved by the failure policy.
    pub access_errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insufficient_context: Option<InsufficientContext>,
    pub assembled_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AssemblyMetadata {
    pub fn new(scope: ScopeMode) -> Self {
        Self {
            scope,
            retrieval_method: RetrievalMethod::None,
            fallback_used: false,
            cache_status: CacheStatus::NotApplicable,
            degraded: Vec::new(),
            denied_count: 0,
            access_errors: 0,
            insufficient_context: None,
            assembled_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Record a degraded collaborator once.
    pub fn mark_degraded(&mut self, collaborator: &str) {
        if !self.degraded.iter().any(|d| d == collaborator) {
            self.degraded.push(collaborator.to_string());
        }
    }
}

/// A bounded, quality-checked, access-controlled context. Immutable once
/// returned; never persisted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub primary_entity: EntityRef,
    pub related_entities: Vec<EntityRef>,
    /// Post-filter, post-budget chunks, sorted by relevance.
    pub rag_chunks: Vec<RetrievedChunk>,
    pub formatted_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<QualityMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_info: Option<TruncationInfo>,
    pub warnings: Vec<Warning>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}
