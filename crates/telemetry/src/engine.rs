//! Thread-safe telemetry engine — records diagnostic events and caught
//! exceptions and serves queries over them.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};

use crate::model::*;

/// Oldest records are dropped once this many accumulate.
const MAX_RECORDS: usize = 10_000;

/// The recording sink.
///
/// Thread-safe via `RwLock`. Optionally mirrors every record to `tracing`
/// so a service gets log lines and queryable diagnostics from one sink.
pub struct TelemetryEngine {
    events: RwLock<Vec<TrackedEvent>>,
    exceptions: RwLock<Vec<TrackedException>>,
    forward_to_tracing: bool,
}

impl TelemetryEngine {
    /// Create a recorder that does not log.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            exceptions: RwLock::new(Vec::new()),
            forward_to_tracing: false,
        }
    }

    /// Create a recorder that also logs every record via `tracing`.
    pub fn with_tracing() -> Self {
        Self {
            forward_to_tracing: true,
            ..Self::new()
        }
    }

    // A poisoned lock still guards a valid Vec.
    fn read_events(&self) -> RwLockReadGuard<'_, Vec<TrackedEvent>> {
        self.events.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_events(&self) -> RwLockWriteGuard<'_, Vec<TrackedEvent>> {
        self.events.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_exceptions(&self) -> RwLockReadGuard<'_, Vec<TrackedException>> {
        self.exceptions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_exceptions(&self) -> RwLockWriteGuard<'_, Vec<TrackedException>> {
        self.exceptions.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<TrackedEvent> {
        self.read_events().clone()
    }

    /// Events with the given name, oldest first.
    pub fn events_named(&self, name: &str) -> Vec<TrackedEvent> {
        self.read_events()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn event_count(&self, name: &str) -> usize {
        self.read_events().iter().filter(|e| e.name == name).count()
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.read_events().iter().any(|e| e.name == name)
    }

    /// All recorded exceptions, oldest first.
    pub fn exceptions(&self) -> Vec<TrackedException> {
        self.read_exceptions().clone()
    }

    /// Exceptions recorded under an operation tag.
    pub fn exceptions_for(&self, operation: &str) -> Vec<TrackedException> {
        self.read_exceptions()
            .iter()
            .filter(|e| e.context.operation == operation)
            .cloned()
            .collect()
    }

    /// Aggregate counts per event name and per operation.
    pub fn summary(&self) -> TelemetrySummary {
        let mut summary = TelemetrySummary::default();
        for event in self.read_events().iter() {
            *summary.events.entry(event.name.clone()).or_insert(0) += 1;
            summary.total_events += 1;
        }
        for ex in self.read_exceptions().iter() {
            *summary
                .exceptions
                .entry(ex.context.operation.clone())
                .or_insert(0) += 1;
            summary.total_exceptions += 1;
        }
        summary
    }

    // ── Maintenance ───────────────────────────────────────────────────

    /// Drop records older than `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut events = self.write_events();
        let mut exceptions = self.write_exceptions();
        let before = events.len() + exceptions.len();
        events.retain(|e| e.recorded_at >= cutoff);
        exceptions.retain(|e| e.recorded_at >= cutoff);
        before - events.len() - exceptions.len()
    }

    pub fn clear(&self) {
        self.write_events().clear();
        self.write_exceptions().clear();
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilitySink for TelemetryEngine {
    fn track_event(&self, name: &str, props: serde_json::Value) {
        if self.forward_to_tracing {
            tracing::info!(event = name, props = %props, "diagnostic event");
        }
        let mut events = self.write_events();
        if events.len() >= MAX_RECORDS {
            let drain = MAX_RECORDS / 10;
            events.drain(..drain);
        }
        events.push(TrackedEvent::new(name, props));
    }

    fn track_exception(&self, error: &dyn std::error::Error, context: ExceptionContext) {
        if self.forward_to_tracing {
            tracing::warn!(
                operation = %context.operation,
                tenant_id = %context.tenant_id,
                error = %error,
                "collaborator failure recorded"
            );
        }
        let mut exceptions = self.write_exceptions();
        if exceptions.len() >= MAX_RECORDS {
            let drain = MAX_RECORDS / 10;
            exceptions.drain(..drain);
        }
        exceptions.push(TrackedException::new(error.to_string(), context));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use contextloom_core::error::QualityError;
    use contextloom_core::events;

    #[test]
    fn records_events_by_name() {
        let engine = TelemetryEngine::new();
        engine.track_event(events::CACHE_MISS, serde_json::json!({"key": "k1"}));
        engine.track_event(events::CACHE_MISS, serde_json::json!({"key": "k2"}));
        engine.track_event(events::CACHE_HIT, serde_json::json!({"key": "k3"}));

        assert_eq!(engine.event_count(events::CACHE_MISS), 2);
        assert!(engine.has_event(events::CACHE_HIT));
        assert!(!engine.has_event(events::CACHE_INVALIDATED_STALE));
        assert_eq!(engine.events_named(events::CACHE_HIT)[0].prop_str("key"), Some("k3"));
    }

    #[test]
    fn records_exceptions_with_operation() {
        let engine = TelemetryEngine::new();
        let err = QualityError::AssessmentFailed("model offline".into());
        engine.track_exception(
            &err,
            ExceptionContext::new(events::operations::ASSESS_CONTEXT_QUALITY, "t1"),
        );

        let recorded = engine.exceptions_for(events::operations::ASSESS_CONTEXT_QUALITY);
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].error.contains("model offline"));
        assert_eq!(recorded[0].context.tenant_id, "t1");
    }

    #[test]
    fn summary_counts_everything() {
        let engine = TelemetryEngine::new();
        engine.track_event("a", serde_json::Value::Null);
        engine.track_event("a", serde_json::Value::Null);
        engine.track_event("b", serde_json::Value::Null);
        let err = QualityError::UnknownIntent("x".into());
        engine.track_exception(&err, ExceptionContext::new("op", "t"));

        let summary = engine.summary();
        assert_eq!(summary.events["a"], 2);
        assert_eq!(summary.events["b"], 1);
        assert_eq!(summary.exceptions["op"], 1);
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.total_exceptions, 1);
    }

    #[test]
    fn prune_removes_old_records() {
        let engine = TelemetryEngine::new();
        engine.track_event("old", serde_json::Value::Null);
        let removed = engine.prune_before(Utc::now() + Duration::seconds(1));
        assert_eq!(removed, 1);
        assert!(engine.events().is_empty());
    }

    #[test]
    fn clear_empties_both_logs() {
        let engine = TelemetryEngine::with_tracing();
        engine.track_event("x", serde_json::Value::Null);
        let err = QualityError::UnknownIntent("x".into());
        engine.track_exception(&err, ExceptionContext::new("op", "t"));
        engine.clear();
        assert_eq!(engine.summary().total_events, 0);
        assert_eq!(engine.summary().total_exceptions, 0);
    }
}
