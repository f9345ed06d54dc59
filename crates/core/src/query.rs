//! Incoming queries and their classified intent.

use serde::{Deserialize, Serialize};

/// Which entities are eligible and whether caching applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// No scoping: free retrieval only.
    #[default]
    None,
    /// Scoped to one entity.
    Entity,
    /// Scoped to an entity and its graph neighbourhood.
    Project,
    /// Tenant-wide retrieval. The only cached scope.
    Global,
}

impl ScopeMode {
    /// Whether this scope needs a scope entity id.
    pub fn requires_entity(self) -> bool {
        matches!(self, Self::Entity | Self::Project)
    }

    pub fn is_cacheable(self) -> bool {
        self == Self::Global
    }
}

impl std::fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Entity => write!(f, "entity"),
            Self::Project => write!(f, "project"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// A natural-language query with its scope and budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    #[serde(default)]
    pub scope_mode: ScopeMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_entity_id: Option<String>,

    /// Hard token ceiling for the assembled context.
    pub token_budget: usize,
}

impl Query {
    pub fn new(text: impl Into<String>, token_budget: usize) -> Self {
        Self {
            text: text.into(),
            scope_mode: ScopeMode::None,
            scope_entity_id: None,
            token_budget,
        }
    }

    pub fn scoped(mut self, mode: ScopeMode, entity_id: Option<String>) -> Self {
        self.scope_mode = mode;
        self.scope_entity_id = entity_id;
        self
    }
}

/// Labels of intents that tolerate an empty context.
const EXPLORATORY_LABELS: &[&str] = &["search", "exploratory", "lookup", "discovery"];

/// The classified intent of a query (classification happens upstream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub label: String,

    #[serde(default)]
    pub confidence: f32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope_hints: Vec<String>,
}

impl Intent {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            scope_hints: Vec::new(),
        }
    }

    /// Exploratory and search-type intents may legitimately find nothing.
    pub fn is_exploratory(&self) -> bool {
        let label = self.label.to_lowercase();
        EXPLORATORY_LABELS.contains(&label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_global_scope_is_cacheable() {
        assert!(ScopeMode::Global.is_cacheable());
        assert!(!ScopeMode::Project.is_cacheable());
        assert!(!ScopeMode::Entity.is_cacheable());
        assert!(!ScopeMode::None.is_cacheable());
    }

    #[test]
    fn scoped_modes_require_entity() {
        assert!(ScopeMode::Entity.requires_entity());
        assert!(ScopeMode::Project.requires_entity());
        assert!(!ScopeMode::Global.requires_entity());
    }

    #[test]
    fn exploratory_intents_detected_case_insensitively() {
        assert!(Intent::new("Search", 0.9).is_exploratory());
        assert!(Intent::new("exploratory", 0.4).is_exploratory());
        assert!(!Intent::new("analysis", 0.8).is_exploratory());
    }

    #[test]
    fn scope_mode_serializes_snake_case() {
        let json = serde_json::to_string(&ScopeMode::Project).unwrap();
        assert_eq!(json, "\"project\"");
    }
}
