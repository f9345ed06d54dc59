//! JSON fixtures: a whole tenant's worth of backend state in one file.
//!
//! ```json
//! {
//!   "tenant_id": "acme",
//!   "entities": [{ "id": "proj-1", "type_id": "project", "display_name": "Apollo" }],
//!   "vector_hits": [{ "entity_id": "doc-1", "entity_type_id": "document",
//!                     "content": "...", "score": 0.9, "chunk_index": 0 }],
//!   "documents": [{ "entity_id": "doc-2", "entity_type_id": "document",
//!                   "content": "..." }],
//!   "denied": ["doc-3"]
//! }
//! ```
//!
//! `semantic_disabled` / `cache_disabled` swap in the no-op backends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use contextloom_config::QualityConfig;
use contextloom_core::cache::KeyValueCache;
use contextloom_core::chunk::{SearchBackend, SearchHit};
use contextloom_core::entity::Entity;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::StaticAccessControl;
use crate::cache::InMemoryCache;
use crate::entity_store::InMemoryEntityStore;
use crate::noop::{NoopCache, NoopSearch};
use crate::quality::BasicQualityAssessor;
use crate::search::{KeywordIndex, StaticSearch};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Failed to read fixture {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse fixture {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// A document for the keyword index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDocument {
    pub entity_id: String,
    pub entity_type_id: String,
    #[serde(default)]
    pub chunk_index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub tenant_id: String,

    #[serde(default)]
    pub entities: Vec<Entity>,

    /// Pre-scored semantic results, returned for any query.
    #[serde(default)]
    pub vector_hits: Vec<SearchHit>,

    /// Keyword-searchable documents.
    #[serde(default)]
    pub documents: Vec<FixtureDocument>,

    /// Entity ids the ACL denies for every user.
    #[serde(default)]
    pub denied: Vec<String>,

    /// Entity ids whose access check errors.
    #[serde(default)]
    pub access_failures: Vec<String>,

    /// Entity ids whose store lookup errors.
    #[serde(default)]
    pub unavailable_entities: Vec<String>,

    #[serde(default)]
    pub vector_failing: bool,

    #[serde(default)]
    pub keyword_failing: bool,

    /// Deploy without a vector index.
    #[serde(default)]
    pub semantic_disabled: bool,

    /// Deploy without a cache.
    #[serde(default)]
    pub cache_disabled: bool,
}

/// Backends populated from a [`Fixture`].
pub struct FixtureBackends {
    pub tenant_id: String,
    pub entity_store: Arc<InMemoryEntityStore>,
    pub semantic: Arc<dyn SearchBackend>,
    pub keyword: Arc<KeywordIndex>,
    pub access: Arc<StaticAccessControl>,
    pub cache: Arc<dyn KeyValueCache>,
    pub quality: Arc<BasicQualityAssessor>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path).map_err(|e| FixtureError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let fixture: Fixture = serde_json::from_str(&content).map_err(|e| FixtureError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(
            path = %path.display(),
            entities = fixture.entities.len(),
            vector_hits = fixture.vector_hits.len(),
            documents = fixture.documents.len(),
            "Loaded fixture"
        );
        Ok(fixture)
    }

    pub async fn into_backends(self, quality: QualityConfig) -> FixtureBackends {
        let entity_store = Arc::new(InMemoryEntityStore::new());
        for entity in self.entities {
            entity_store.insert(&self.tenant_id, entity).await;
        }
        for id in &self.unavailable_entities {
            entity_store.mark_unavailable(id).await;
        }

        let semantic: Arc<dyn SearchBackend> = if self.semantic_disabled {
            Arc::new(NoopSearch)
        } else {
            let search = StaticSearch::new("vector", self.vector_hits);
            search.set_failing(self.vector_failing);
            Arc::new(search)
        };
        let cache: Arc<dyn KeyValueCache> = if self.cache_disabled {
            Arc::new(NoopCache)
        } else {
            Arc::new(InMemoryCache::new())
        };

        let keyword = Arc::new(KeywordIndex::new("keyword"));
        for doc in &self.documents {
            keyword
                .add_document(
                    &self.tenant_id,
                    &doc.entity_id,
                    &doc.entity_type_id,
                    doc.chunk_index,
                    &doc.content,
                )
                .await;
        }
        keyword.set_failing(self.keyword_failing);

        let access = Arc::new(StaticAccessControl::new());
        for id in &self.denied {
            access.deny(id).await;
        }
        for id in &self.access_failures {
            access.fail_on(id).await;
        }

        FixtureBackends {
            tenant_id: self.tenant_id,
            entity_store,
            semantic,
            keyword,
            access,
            cache,
            quality: Arc::new(BasicQualityAssessor::new(quality)),
        }
    }
}
