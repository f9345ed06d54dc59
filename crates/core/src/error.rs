//! Error types for the contextloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error type. None of them except
//! [`AssemblyError`] ever escapes the assembler: they are caught at the
//! stage boundary and turned into diagnostics.

use thiserror::Error;

/// The top-level error type for all contextloom operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Entity store error: {0}")]
    Store(#[from] StoreError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Access control error: {0}")]
    Access(#[from] AccessError),

    #[error("Quality assessment error: {0}")]
    Quality(#[from] QualityError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Assembly rejected: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

/// A transport failure talking to the entity store. "Not found" is never
/// an error; it is `Ok(None)`.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Entity store unavailable: {0}")]
    Unavailable(String),

    #[error("Entity store request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Entity store returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Search backend '{backend}' failed: {reason}")]
    BackendFailed { backend: String, reason: String },

    #[error("Search backend '{backend}' timed out after {timeout_ms}ms")]
    Timeout { backend: String, timeout_ms: u64 },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum AccessError {
    #[error("Access check failed for entity {entity_id}: {reason}")]
    CheckFailed { entity_id: String, reason: String },

    #[error("Access check timed out for entity {entity_id} after {timeout_ms}ms")]
    Timeout { entity_id: String, timeout_ms: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum QualityError {
    #[error("Quality assessment failed: {0}")]
    AssessmentFailed(String),

    #[error("No quality requirement for intent '{0}'")]
    UnknownIntent(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache transport error: {0}")]
    Transport(String),

    #[error("Cache payload is corrupt: {0}")]
    Corrupt(String),

    #[error("Cache operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Malformed request input. The only failure allowed to reject an
/// assembly call outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("tenant id is required")]
    MissingTenant,

    #[error("user id is required")]
    MissingUser,

    #[error("scope '{scope}' requires a scope entity id")]
    MissingScopeEntity { scope: String },

    #[error("token budget {budget} does not exceed wrapper overhead {overhead}")]
    InvalidBudget { budget: usize, overhead: usize },
}
