//! Stable diagnostic event names.
//!
//! Every degraded branch of the engine emits exactly one of these through
//! the [`ObservabilitySink`](crate::observe::ObservabilitySink). Dashboards
//! and tests match on them verbatim, so they never change spelling.

pub const PRIMARY_ENTITY_MISSING: &str = "primary_entity_missing";
pub const ENTITY_LOOKUP_FAILED: &str = "entity_lookup_failed";
pub const RELATED_ENTITY_MISSING: &str = "related_entity_missing";
pub const RELATED_ENTITY_LOOKUP_FAILED: &str = "related_entity_lookup_failed";

pub const RETRIEVAL_FALLBACK_USED: &str = "retrieval_fallback_used";
pub const RETRIEVAL_FAILED: &str = "retrieval_failed";
pub const GRAPH_FILTER_APPLIED: &str = "graph_filter_applied";

pub const PERMISSION_FILTERED: &str = "permission_filtered";
pub const ACCESS_CHECK_FAILED: &str = "access_check_failed";

pub const CONTEXT_TRUNCATED: &str = "context_truncated";

pub const EMPTY_CONTEXT: &str = "empty_context";
pub const INSUFFICIENT_CONTEXT: &str = "insufficient_context";
pub const LOW_RELEVANCE: &str = "low_relevance";
pub const QUALITY_ASSESSMENT_FAILED: &str = "quality_assessment_failed";

pub const CACHE_HIT: &str = "cache_hit";
pub const CACHE_MISS: &str = "cache_miss";
pub const CACHE_INVALIDATED_STALE: &str = "cache_invalidated_stale";
pub const CACHE_READ_FAILED: &str = "cache_read_failed";
pub const CACHE_PAYLOAD_CORRUPT: &str = "cache_payload_corrupt";
pub const CACHE_WRITE_FAILED: &str = "cache_write_failed";

pub const CONTEXT_ASSEMBLED: &str = "context_assembled";

/// Operation tags attached to recorded exceptions.
pub mod operations {
    pub const GET_ENTITY: &str = "get_entity";
    pub const RESOLVE_RELATIONSHIP: &str = "resolve_relationship";
    pub const SEMANTIC_SEARCH: &str = "semantic_search";
    pub const KEYWORD_SEARCH: &str = "keyword_search";
    pub const CHECK_ACCESS: &str = "check_access";
    pub const ASSESS_CONTEXT_QUALITY: &str = "assess_context_quality";
    pub const RESOLVE_REQUIREMENTS: &str = "resolve_quality_requirements";
    pub const CACHE_READ: &str = "cache_read";
    pub const CACHE_WRITE: &str = "cache_write";
}
