//! Access control for contextloom — per-fragment permission filtering and
//! audit logging.
//!
//! Provides:
//! - **Access filter**: checks every candidate entity and chunk against the
//!   injected [`AccessControl`](contextloom_core::AccessControl) capability,
//!   with an explicit fail-open / fail-closed policy for checks that throw
//! - **Audit logging**: structured record of every denial and every failed
//!   check

pub mod audit;
pub mod filter;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use filter::{AccessFilter, AccessSubject, FilterOutcome, FilterStage};
