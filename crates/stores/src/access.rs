//! Static access control list.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use contextloom_core::access::{AccessControl, AccessDecision, AccessRequest};
use contextloom_core::error::AccessError;
use tokio::sync::RwLock;

/// Allows everything except listed denials.
///
/// Denials can be tenant-wide (any user) or per `(user, entity)` pair.
/// Entities marked failing make the check itself error.
pub struct StaticAccessControl {
    denied: Arc<RwLock<HashSet<String>>>,
    denied_for_user: Arc<RwLock<HashSet<(String, String)>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl StaticAccessControl {
    pub fn new() -> Self {
        Self {
            denied: Arc::new(RwLock::new(HashSet::new())),
            denied_for_user: Arc::new(RwLock::new(HashSet::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn deny(&self, entity_id: &str) {
        self.denied.write().await.insert(entity_id.to_string());
    }

    pub async fn deny_for_user(&self, user_id: &str, entity_id: &str) {
        self.denied_for_user
            .write()
            .await
            .insert((user_id.to_string(), entity_id.to_string()));
    }

    pub async fn fail_on(&self, entity_id: &str) {
        self.failing.write().await.insert(entity_id.to_string());
    }
}

impl Default for StaticAccessControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessControl for StaticAccessControl {
    fn name(&self) -> &str {
        "static_acl"
    }

    async fn check_access(&self, request: &AccessRequest) -> Result<AccessDecision, AccessError> {
        if self.failing.read().await.contains(&request.entity_id) {
            return Err(AccessError::CheckFailed {
                entity_id: request.entity_id.clone(),
                reason: "permission service unavailable".into(),
            });
        }
        if self.denied.read().await.contains(&request.entity_id) {
            return Ok(AccessDecision::deny());
        }
        let pair = (request.user_id.clone(), request.entity_id.clone());
        if self.denied_for_user.read().await.contains(&pair) {
            return Ok(AccessDecision::deny());
        }
        Ok(AccessDecision::allow())
    }
}
