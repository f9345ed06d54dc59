//! Entities — typed graph nodes owned by the external entity store.
//!
//! The engine only ever reads entities. A missing entity is a normal
//! outcome (`Ok(None)`), never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A declared one-hop link from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub target_id: String,
    pub target_type_id: String,
}

impl Relationship {
    pub fn new(target_id: impl Into<String>, target_type_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            target_type_id: target_type_id.into(),
        }
    }
}

/// A typed record with structured data and declared links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,

    pub type_id: String,

    pub display_name: String,

    /// Opaque structured payload, rendered as-is into the context.
    #[serde(default)]
    pub structured_data: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        type_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            display_name: display_name.into(),
            structured_data: serde_json::Map::new(),
            relationships: Vec::new(),
        }
    }

    /// Add a field to the structured payload.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.structured_data.insert(key.into(), value);
        self
    }

    /// Declare a link to another entity.
    pub fn link_to(mut self, target_id: impl Into<String>, target_type_id: impl Into<String>) -> Self {
        self.relationships
            .push(Relationship::new(target_id, target_type_id));
        self
    }
}

/// The entity store the engine reads from.
///
/// Implementations: in-memory (testing, fixtures), and whatever database
/// adapter the embedding service provides.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// The store name (e.g., "in_memory", "postgres").
    fn name(&self) -> &str;

    /// Fetch one entity. `Ok(None)` means "not found".
    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> std::result::Result<Option<Entity>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_links_and_fields() {
        let entity = Entity::new("proj-1", "project", "Apollo")
            .with_field("status", serde_json::json!("active"))
            .link_to("doc-1", "document")
            .link_to("note-1", "note");

        assert_eq!(entity.relationships.len(), 2);
        assert_eq!(entity.relationships[0].target_id, "doc-1");
        assert_eq!(entity.structured_data["status"], "active");
    }

    #[test]
    fn entity_deserializes_without_optional_fields() {
        let json = r#"{"id":"a","type_id":"note","display_name":"A"}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert!(entity.relationships.is_empty());
        assert!(entity.structured_data.is_empty());
    }
}
