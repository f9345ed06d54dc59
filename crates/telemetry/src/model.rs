//! Data model for recorded events and exceptions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contextloom_core::observe::ExceptionContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named diagnostic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub id: String,
    pub name: String,
    pub props: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl TrackedEvent {
    pub fn new(name: impl Into<String>, props: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            props,
            recorded_at: Utc::now(),
        }
    }

    /// Look up a string property.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(|v| v.as_str())
    }
}

/// A collaborator failure caught at a stage boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedException {
    pub id: String,
    pub error: String,
    pub context: ExceptionContext,
    pub recorded_at: DateTime<Utc>,
}

impl TrackedException {
    pub fn new(error: impl Into<String>, context: ExceptionContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            error: error.into(),
            context,
            recorded_at: Utc::now(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.context.operation
    }
}

/// Aggregate counts over everything recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Event count per event name.
    pub events: BTreeMap<String, usize>,
    /// Exception count per operation tag.
    pub exceptions: BTreeMap<String, usize>,
    pub total_events: usize,
    pub total_exceptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_prop_lookup() {
        let event = TrackedEvent::new(
            "permission_filtered",
            serde_json::json!({"entity_id": "doc-9", "count": 1}),
        );
        assert_eq!(event.prop_str("entity_id"), Some("doc-9"));
        assert_eq!(event.prop_str("count"), None);
        assert!(!event.id.is_empty());
    }

    #[test]
    fn exception_exposes_operation() {
        let ex = TrackedException::new(
            "timeout",
            ExceptionContext::new("assess_context_quality", "tenant-a"),
        );
        assert_eq!(ex.operation(), "assess_context_quality");
    }
}
