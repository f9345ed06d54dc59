//! # contextloom core
//!
//! Domain types, collaborator traits, and error definitions for the
//! contextloom context-assembly engine. This crate has **no runtime
//! dependencies**: it defines the model every other crate implements
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator the engine talks to (entity store, search,
//! access control, quality assessment, key-value cache, token estimator,
//! observability) is a trait here. Implementations live elsewhere:
//! - in-memory and no-op backends in `contextloom-stores`
//! - observability sinks in `contextloom-telemetry`
//! - production adapters in whatever service embeds the engine

pub mod access;
pub mod cache;
pub mod chunk;
pub mod context;
pub mod entity;
pub mod error;
pub mod events;
pub mod observe;
pub mod quality;
pub mod query;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use access::{AccessControl, AccessDecision, AccessRequest};
pub use cache::KeyValueCache;
pub use chunk::{ChunkOrigin, RetrievedChunk, SearchBackend, SearchHit, SearchRequest};
pub use context::{
    AssembledContext, AssemblyMetadata, CacheStatus, EntityRef, InsufficientContext,
    RetrievalMethod, Severity, TruncationInfo, Warning, WarningKind,
};
pub use entity::{Entity, EntityStore, Relationship};
pub use error::{
    AccessError, AssemblyError, CacheError, Error, QualityError, Result, RetrievalError,
    StoreError,
};
pub use observe::{ExceptionContext, ObservabilitySink};
pub use quality::{
    CandidateSummary, QualityAssessor, QualityCandidate, QualityMetrics, QualityRequirement,
};
pub use query::{Intent, Query, ScopeMode};
pub use token::{Fragment, HeuristicEstimator, TokenEstimator};
