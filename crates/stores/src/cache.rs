//! In-memory key-value cache with per-entry expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use contextloom_core::cache::KeyValueCache;
use contextloom_core::error::CacheError;
use tokio::sync::RwLock;

struct Slot {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local stand-in for a shared cache service.
///
/// Expired entries are dropped lazily on read. `set_failing(true)` turns
/// every call into a transport error.
pub struct InMemoryCache {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    failing: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Write a raw value, bypassing nothing but the failure toggle.
    /// Lets tests plant stale or corrupt payloads.
    pub async fn put_raw(&self, key: &str, value: &str, ttl_secs: u64) {
        self.slots.write().await.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Utc::now() + Duration::seconds(ttl_secs as i64),
            },
        );
    }

    pub async fn peek(&self, key: &str) -> Option<String> {
        self.slots.read().await.get(key).map(|s| s.value.clone())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let now = Utc::now();
        let mut slots = self.slots.write().await;
        match slots.get(key) {
            Some(slot) if slot.expires_at > now => Ok(Some(slot.value.clone())),
            Some(_) => {
                slots.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        self.check()?;
        self.slots.write().await.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: Utc::now() + Duration::seconds(ttl_secs as i64),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.slots.write().await.remove(key);
        Ok(())
    }
}
