//! Observability sink — where named diagnostic events and recorded
//! exceptions go.

use serde::{Deserialize, Serialize};

/// Where an exception was caught.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionContext {
    /// Stable operation tag (see [`crate::events::operations`]).
    pub operation: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ExceptionContext {
    pub fn new(operation: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            tenant_id: tenant_id.into(),
            entity_id: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn for_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Fire-and-forget diagnostics. Implementations must never panic and
/// never block for long; the engine calls them on its hot path.
pub trait ObservabilitySink: Send + Sync {
    fn track_event(&self, name: &str, props: serde_json::Value);

    fn track_exception(&self, error: &dyn std::error::Error, context: ExceptionContext);
}
