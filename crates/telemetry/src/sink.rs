//! Stateless sinks.

use contextloom_core::observe::{ExceptionContext, ObservabilitySink};

/// Forwards events and exceptions to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn track_event(&self, name: &str, props: serde_json::Value) {
        tracing::info!(event = name, props = %props, "diagnostic event");
    }

    fn track_exception(&self, error: &dyn std::error::Error, context: ExceptionContext) {
        tracing::warn!(
            operation = %context.operation,
            tenant_id = %context.tenant_id,
            entity_id = context.entity_id.as_deref().unwrap_or(""),
            error = %error,
            "collaborator failure recorded"
        );
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn track_event(&self, _name: &str, _props: serde_json::Value) {}

    fn track_exception(&self, _error: &dyn std::error::Error, _context: ExceptionContext) {}
}
