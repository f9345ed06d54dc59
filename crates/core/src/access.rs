//! Access control — the per-entity permission check the engine consults.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AccessError;

/// One permission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub user_id: String,
    pub tenant_id: String,
    pub entity_id: String,
    pub required_permission: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub has_access: bool,
}

impl AccessDecision {
    pub fn allow() -> Self {
        Self { has_access: true }
    }

    pub fn deny() -> Self {
        Self { has_access: false }
    }
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    fn name(&self) -> &str;

    async fn check_access(
        &self,
        request: &AccessRequest,
    ) -> std::result::Result<AccessDecision, AccessError>;
}
