//! Observability sinks for contextloom.
//!
//! The engine reports every degraded branch as a named event and every
//! caught collaborator failure as an exception. This crate provides the
//! sinks those reports go to:
//! - [`TelemetryEngine`]: thread-safe recorder with queries, for tests
//!   and for services that export diagnostics in batches
//! - [`TracingSink`]: forwards to `tracing`
//! - [`NoopSink`]: discards everything

pub mod engine;
pub mod model;
pub mod sink;

pub use engine::TelemetryEngine;
pub use model::{TelemetrySummary, TrackedEvent, TrackedException};
pub use sink::{NoopSink, TracingSink};
