//! Audit logging — structured record of access-control decisions.
//!
//! Only the interesting decisions are recorded: denials, and checks that
//! failed and were resolved by the failure policy.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub tenant_id: String,
    /// The user the context was assembled for.
    pub actor: String,
    /// The entity that was checked.
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable access events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A graph-linked entity was withheld from `related`.
    RelatedEntityDenied,
    /// A retrieved chunk was withheld from the context.
    ChunkDenied { chunk_count: usize },
    /// The access check itself failed.
    AccessCheckFailed { permission: String },
}

/// Outcome of an audited decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Denied,
    /// Check failed; fragment included anyway.
    FailedOpen,
    /// Check failed; fragment excluded.
    FailedClosed,
}

/// Trait for audit log sinks (where entries are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// In-memory audit logger that keeps entries and forwards them to sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        tenant_id: &str,
        actor: &str,
        target: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            tenant_id: tenant_id.into(),
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }
        self.lock().push(entry);
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Get entries with the given outcome.
    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Clear all stored entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            tenant_id = %entry.tenant_id,
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_and_retrieve_entries() {
        let logger = AuditLogger::new();
        logger.log(
            AuditEvent::RelatedEntityDenied,
            "t1",
            "user-1",
            "note-7",
            AuditOutcome::Denied,
            None,
        );
        logger.log(
            AuditEvent::AccessCheckFailed {
                permission: "read".into(),
            },
            "t1",
            "user-1",
            "doc-3",
            AuditOutcome::FailedOpen,
            Some("acl timeout".into()),
        );

        assert_eq!(logger.count(), 2);
        let entries = logger.entries();
        assert_eq!(entries[0].target, "note-7");
        assert_eq!(entries[1].details.as_deref(), Some("acl timeout"));
    }

    #[test]
    fn filter_by_outcome() {
        let logger = AuditLogger::new();
        logger.log(
            AuditEvent::ChunkDenied { chunk_count: 2 },
            "t1",
            "user-1",
            "doc-1",
            AuditOutcome::Denied,
            None,
        );
        logger.log(
            AuditEvent::AccessCheckFailed {
                permission: "read".into(),
            },
            "t1",
            "user-1",
            "doc-2",
            AuditOutcome::FailedClosed,
            None,
        );

        assert_eq!(logger.entries_by_outcome(&AuditOutcome::Denied).len(), 1);
        let closed = logger.entries_by_outcome(&AuditOutcome::FailedClosed);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].target, "doc-2");
    }

    #[test]
    fn clear_entries() {
        let logger = AuditLogger::new();
        logger.log(
            AuditEvent::RelatedEntityDenied,
            "t1",
            "user",
            "e1",
            AuditOutcome::Denied,
            None,
        );
        assert_eq!(logger.count(), 1);
        logger.clear();
        assert_eq!(logger.count(), 0);
    }

    #[test]
    fn audit_event_variants_serialize() {
        let events = vec![
            AuditEvent::RelatedEntityDenied,
            AuditEvent::ChunkDenied { chunk_count: 3 },
            AuditEvent::AccessCheckFailed {
                permission: "read".into(),
            },
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let round_tripped: AuditEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(round_tripped, event);
        }
    }

    #[test]
    fn custom_sink_receives_entries() {
        use std::sync::Arc;

        struct TestSink {
            received: Arc<Mutex<Vec<String>>>,
        }

        impl AuditSink for TestSink {
            fn record(&self, entry: &AuditEntry) {
                self.received.lock().unwrap().push(entry.target.clone());
            }
        }

        let received = Arc::new(Mutex::new(Vec::new()));
        let logger = AuditLogger::with_sinks(vec![Box::new(TestSink {
            received: received.clone(),
        })]);

        logger.log(
            AuditEvent::RelatedEntityDenied,
            "t1",
            "user",
            "secret-doc",
            AuditOutcome::Denied,
            None,
        );

        let sink_entries = received.lock().unwrap();
        assert_eq!(sink_entries.as_slice(), ["secret-doc".to_string()]);
    }

    #[test]
    fn debug_format() {
        let logger = AuditLogger::new();
        let debug_str = format!("{logger:?}");
        assert!(debug_str.contains("AuditLogger"));
        assert!(debug_str.contains("entry_count"));
    }
}
