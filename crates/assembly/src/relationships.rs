//! Relationship resolver — one-hop expansion of the primary entity.
//!
//! Every declared link is looked up concurrently. Missing targets are the
//! expected steady state for deleted entities and are skipped; lookup
//! failures are recorded and skipped. Neither is fatal.

use std::collections::HashSet;
use std::sync::Arc;

use contextloom_core::entity::Entity;
use contextloom_core::events::{self, operations};
use contextloom_core::observe::{ExceptionContext, ObservabilitySink};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::gateway::EntityGateway;

/// Related entities in declaration order, plus what was skipped.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRelations {
    pub entities: Vec<Entity>,
    /// Target ids that resolved to nothing.
    pub missing: Vec<String>,
    /// Target ids whose lookup failed.
    pub failed: Vec<String>,
}

impl ResolvedRelations {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.id.as_str())
    }
}

pub struct RelationshipResolver {
    gateway: Arc<EntityGateway>,
    sink: Arc<dyn ObservabilitySink>,
}

impl RelationshipResolver {
    pub fn new(gateway: Arc<EntityGateway>, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self { gateway, sink }
    }

    pub async fn resolve(&self, tenant_id: &str, primary: Option<&Entity>) -> ResolvedRelations {
        let Some(primary) = primary else {
            return ResolvedRelations::default();
        };

        // Each target once, first declaration wins; self-links skipped.
        let mut seen = HashSet::new();
        let targets: Vec<&str> = primary
            .relationships
            .iter()
            .map(|r| r.target_id.as_str())
            .filter(|id| !id.is_empty() && *id != primary.id)
            .filter(|id| seen.insert(*id))
            .collect();

        if targets.is_empty() {
            return ResolvedRelations::default();
        }

        let lookups = targets
            .iter()
            .map(|id| self.gateway.get_entity(tenant_id, id));
        let results = join_all(lookups).await;

        let mut resolved = ResolvedRelations::default();
        for (target_id, result) in targets.iter().zip(results) {
            match result {
                Ok(Some(entity)) => resolved.entities.push(entity),
                Ok(None) => {
                    debug!(
                        primary_id = %primary.id,
                        target_id = %target_id,
                        "Related entity not found, skipping"
                    );
                    self.sink.track_event(
                        events::RELATED_ENTITY_MISSING,
                        serde_json::json!({
                            "tenant_id": tenant_id,
                            "primary_id": primary.id,
                            "target_id": target_id,
                        }),
                    );
                    resolved.missing.push(target_id.to_string());
                }
                Err(e) => {
                    warn!(
                        primary_id = %primary.id,
                        target_id = %target_id,
                        error = %e,
                        "Related entity lookup failed, skipping"
                    );
                    self.sink.track_exception(
                        &e,
                        ExceptionContext::new(operations::RESOLVE_RELATIONSHIP, tenant_id)
                            .for_entity(*target_id)
                            .with_details(serde_json::json!({ "primary_id": primary.id })),
                    );
                    self.sink.track_event(
                        events::RELATED_ENTITY_LOOKUP_FAILED,
                        serde_json::json!({
                            "tenant_id": tenant_id,
                            "primary_id": primary.id,
                            "target_id": target_id,
                        }),
                    );
                    resolved.failed.push(target_id.to_string());
                }
            }
        }

        debug!(
            primary_id = %primary.id,
            declared = primary.relationships.len(),
            resolved = resolved.entities.len(),
            missing = resolved.missing.len(),
            failed = resolved.failed.len(),
            "Relationships resolved"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_config::EntityStoreConfig;
    use contextloom_stores::InMemoryEntityStore;
    use contextloom_telemetry::TelemetryEngine;

    async fn setup() -> (RelationshipResolver, Arc<InMemoryEntityStore>, Arc<TelemetryEngine>) {
        let store = Arc::new(InMemoryEntityStore::new());
        store.insert("t1", Entity::new("org-1", "organization", "Acme")).await;
        store.insert("t1", Entity::new("note-1", "note", "Kickoff notes")).await;
        let telemetry = Arc::new(TelemetryEngine::new());
        let gateway = Arc::new(EntityGateway::new(store.clone(), &EntityStoreConfig::default()));
        (
            RelationshipResolver::new(gateway, telemetry.clone()),
            store,
            telemetry,
        )
    }

    #[tokio::test]
    async fn no_primary_resolves_nothing() {
        let (resolver, _, telemetry) = setup().await;
        let resolved = resolver.resolve("t1", None).await;
        assert!(resolved.entities.is_empty());
        assert!(telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn preserves_declaration_order_and_skips_missing() {
        let (resolver, _, telemetry) = setup().await;
        let primary = Entity::new("proj-1", "project", "Apollo")
            .link_to("note-1", "note")
            .link_to("deleted-1", "note")
            .link_to("org-1", "organization");

        let resolved = resolver.resolve("t1", Some(&primary)).await;
        let ids: Vec<&str> = resolved.ids().collect();
        assert_eq!(ids, vec!["note-1", "org-1"]);
        assert_eq!(resolved.missing, vec!["deleted-1"]);

        let missing = telemetry.events_named(events::RELATED_ENTITY_MISSING);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].prop_str("target_id"), Some("deleted-1"));
    }

    #[tokio::test]
    async fn duplicates_and_self_links_resolved_once() {
        let (resolver, _, _) = setup().await;
        let primary = Entity::new("proj-1", "project", "Apollo")
            .link_to("org-1", "organization")
            .link_to("proj-1", "project")
            .link_to("org-1", "organization");

        let resolved = resolver.resolve("t1", Some(&primary)).await;
        let ids: Vec<&str> = resolved.ids().collect();
        assert_eq!(ids, vec!["org-1"]);
    }

    #[tokio::test]
    async fn lookup_failure_is_recorded_and_skipped() {
        let (resolver, store, telemetry) = setup().await;
        store.mark_unavailable("org-1").await;
        let primary = Entity::new("proj-1", "project", "Apollo")
            .link_to("org-1", "organization")
            .link_to("note-1", "note");

        let resolved = resolver.resolve("t1", Some(&primary)).await;
        let ids: Vec<&str> = resolved.ids().collect();
        assert_eq!(ids, vec!["note-1"]);
        assert_eq!(resolved.failed, vec!["org-1"]);
        assert_eq!(telemetry.event_count(events::RELATED_ENTITY_LOOKUP_FAILED), 1);
        assert_eq!(
            telemetry.exceptions_for(operations::RESOLVE_RELATIONSHIP).len(),
            1
        );
    }
}
