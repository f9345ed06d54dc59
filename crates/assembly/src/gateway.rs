//! Entity store gateway — one entity by id, under a call timeout.
//!
//! "Not found" is `Ok(None)`. Transport failures and timeouts come back as
//! [`StoreError`] for the caller to handle; there is no retry.

use std::sync::Arc;
use std::time::Duration;

use contextloom_config::EntityStoreConfig;
use contextloom_core::entity::{Entity, EntityStore};
use contextloom_core::error::StoreError;
use tracing::warn;

pub struct EntityGateway {
    store: Arc<dyn EntityStore>,
    timeout: Duration,
}

impl EntityGateway {
    pub fn new(store: Arc<dyn EntityStore>, config: &EntityStoreConfig) -> Self {
        Self::with_timeout(store, Duration::from_millis(config.call_timeout_ms))
    }

    pub fn with_timeout(store: Arc<dyn EntityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub async fn get_entity(&self, tenant_id: &str, id: &str) -> Result<Option<Entity>, StoreError> {
        match tokio::time::timeout(self.timeout, self.store.find_by_id(tenant_id, id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    store = %self.store.name(),
                    entity_id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Entity lookup timed out"
                );
                Err(StoreError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contextloom_stores::InMemoryEntityStore;

    struct SlowStore;

    #[async_trait]
    impl EntityStore for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }

        async fn find_by_id(&self, _tenant_id: &str, _id: &str) -> Result<Option<Entity>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn found_and_not_found() {
        let store = Arc::new(InMemoryEntityStore::new());
        store.insert("t1", Entity::new("proj-1", "project", "Apollo")).await;
        let gateway = EntityGateway::new(store, &EntityStoreConfig::default());

        let found = gateway.get_entity("t1", "proj-1").await.unwrap();
        assert_eq!(found.unwrap().display_name, "Apollo");
        assert!(gateway.get_entity("t1", "missing").await.unwrap().is_none());
        assert!(gateway.get_entity("t2", "proj-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let store = Arc::new(InMemoryEntityStore::new());
        store.mark_unavailable("proj-1").await;
        let gateway = EntityGateway::new(store, &EntityStoreConfig::default());
        let err = gateway.get_entity("t1", "proj-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let gateway = EntityGateway::with_timeout(Arc::new(SlowStore), Duration::from_millis(50));
        let err = gateway.get_entity("t1", "proj-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { timeout_ms: 50 }));
    }
}
