//! # contextloom assembly
//!
//! The context-assembly pipeline: gateways over the external
//! collaborators, the pure ranking/budgeting/formatting stages, and the
//! [`ContextAssembler`] that runs them in order.

pub mod assembler;
pub mod budget;
pub mod cache;
pub mod format;
pub mod gateway;
pub mod quality;
pub mod ranking;
pub mod relationships;
pub mod retrieval;

pub use assembler::{AssemblyRequest, ContextAssembler, ContextAssemblerBuilder};
pub use budget::{BudgetOutcome, TokenBudgeter};
pub use cache::{CacheLookup, CacheManager, CachePayload, PAYLOAD_VERSION};
pub use format::format_context;
pub use gateway::EntityGateway;
pub use quality::{QualityGate, QualityVerdict};
pub use ranking::{GraphFilterOutcome, graph_filter, rank_by_score, unlinked_quota};
pub use relationships::{RelationshipResolver, ResolvedRelations};
pub use retrieval::{RetrievalGateway, RetrievalOutcome};
