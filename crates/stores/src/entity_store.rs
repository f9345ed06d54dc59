//! In-memory entity store — useful for testing and fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use contextloom_core::entity::{Entity, EntityStore};
use contextloom_core::error::StoreError;
use tokio::sync::RwLock;

/// Entities keyed by (tenant, id). Ids marked unavailable fail with a
/// transport error, to exercise degraded paths.
pub struct InMemoryEntityStore {
    entities: Arc<RwLock<HashMap<(String, String), Entity>>>,
    unavailable: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(RwLock::new(HashMap::new())),
            unavailable: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn insert(&self, tenant_id: &str, entity: Entity) {
        self.entities
            .write()
            .await
            .insert((tenant_id.to_string(), entity.id.clone()), entity);
    }

    pub async fn remove(&self, tenant_id: &str, id: &str) -> bool {
        self.entities
            .write()
            .await
            .remove(&(tenant_id.to_string(), id.to_string()))
            .is_some()
    }

    /// Make lookups of `id` fail with [`StoreError::Unavailable`].
    pub async fn mark_unavailable(&self, id: &str) {
        self.unavailable.write().await.insert(id.to_string());
    }

    pub async fn count(&self) -> usize {
        self.entities.read().await.len()
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn find_by_id(&self, tenant_id: &str, id: &str) -> Result<Option<Entity>, StoreError> {
        if self.unavailable.read().await.contains(id) {
            return Err(StoreError::Unavailable(format!(
                "entity {id} is on an unreachable shard"
            )));
        }
        Ok(self
            .entities
            .read()
            .await
            .get(&(tenant_id.to_string(), id.to_string()))
            .cloned())
    }
}
