//! Collaborator backends for contextloom.
//!
//! In-memory implementations of every capability the engine consumes,
//! for tests, fixtures, and single-process deployments, plus no-op
//! variants for capabilities a deployment does not have.

pub mod access;
pub mod cache;
pub mod entity_store;
pub mod fixture;
pub mod noop;
pub mod quality;
pub mod search;

pub use access::StaticAccessControl;
pub use cache::InMemoryCache;
pub use entity_store::InMemoryEntityStore;
pub use fixture::{Fixture, FixtureBackends, FixtureError};
pub use noop::{NoopCache, NoopSearch};
pub use quality::BasicQualityAssessor;
pub use search::{KeywordIndex, StaticSearch};
