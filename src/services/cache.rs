//! Read-through cache with event-driven invalidation
//!
//! Values are stored as JSON with a TTL. Invalidation is decoupled from the
//! call sites: mutations emit a typed `InvalidationEvent` on a channel and a
//! dedicated task translates events into key deletions. The cache is purely
//! an optimization — every caller falls back to the store on a miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

// =============================================================================
// KEYS
// =============================================================================

pub fn project_by_id_key(project_id: Uuid) -> String {
    format!("project:{}", project_id)
}

pub fn projects_list_key(user_id: Uuid, offset: i64, limit: i64, sort: &str, order: &str) -> String {
    format!("projects:{}:{}:{}:{}:{}", user_id, offset, limit, sort, order)
}

pub fn projects_list_prefix(user_id: Uuid) -> String {
    format!("projects:{}:", user_id)
}

// =============================================================================
// CACHE
// =============================================================================

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process TTL cache keyed by namespaced strings
#[derive(Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and deserialize a live entry; expired entries count as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn del(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Drop every key starting with `prefix` (list caches have unbounded
    /// pagination variants, so exact deletion is not possible).
    pub fn del_prefix(&self, prefix: &str) {
        self.entries.write().retain(|k, _| !k.starts_with(prefix));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

// =============================================================================
// INVALIDATION
// =============================================================================

/// Cache invalidation event types
#[derive(Debug, Clone)]
pub enum InvalidationEvent {
    ProjectCreated { user_id: Uuid },
    ProjectUpdated { project_id: Uuid, user_id: Uuid },
    ProjectDeleted { project_id: Uuid, user_id: Uuid },
}

/// Cloneable sender half handed to mutation call sites
#[derive(Clone)]
pub struct InvalidationBus {
    tx: mpsc::UnboundedSender<InvalidationEvent>,
}

impl InvalidationBus {
    /// Emit an invalidation event; delivery is best-effort.
    pub fn emit(&self, event: InvalidationEvent) {
        if self.tx.send(event).is_err() {
            debug!("Invalidation task gone, event dropped");
        }
    }
}

/// Spawn the invalidation task and return the bus used to feed it
pub fn start_invalidation(cache: Arc<Cache>) -> InvalidationBus {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            apply(&cache, &event);
            debug!("Cache invalidation applied: {:?}", event);
        }
    });

    InvalidationBus { tx }
}

fn apply(cache: &Cache, event: &InvalidationEvent) {
    match event {
        InvalidationEvent::ProjectCreated { user_id } => {
            cache.del_prefix(&projects_list_prefix(*user_id));
        }
        InvalidationEvent::ProjectUpdated { project_id, user_id }
        | InvalidationEvent::ProjectDeleted { project_id, user_id } => {
            cache.del(&project_by_id_key(*project_id));
            cache.del_prefix(&projects_list_prefix(*user_id));
        }
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache = Cache::new();
        cache.set("k", &"value".to_string(), DEFAULT_TTL);

        let got: Option<String> = cache.get("k");
        assert_eq!(got, Some("value".to_string()));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = Cache::new();
        cache.set("k", &1u32, Duration::from_secs(0));

        let got: Option<u32> = cache.get("k");
        assert_eq!(got, None);
    }

    #[test]
    fn test_del_prefix_only_touches_matching_keys() {
        let cache = Cache::new();
        let user = Uuid::new_v4();
        cache.set(&projects_list_key(user, 0, 10, "name", "desc"), &1u32, DEFAULT_TTL);
        cache.set(&projects_list_key(user, 10, 10, "name", "desc"), &2u32, DEFAULT_TTL);
        cache.set("project:other", &3u32, DEFAULT_TTL);

        cache.del_prefix(&projects_list_prefix(user));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<u32>("project:other"), Some(3));
    }

    #[test]
    fn test_invalidation_apply_drops_project_keys() {
        let cache = Cache::new();
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        cache.set(&project_by_id_key(project), &1u32, DEFAULT_TTL);
        cache.set(&projects_list_key(user, 0, 10, "name", "desc"), &2u32, DEFAULT_TTL);

        apply(
            &cache,
            &InvalidationEvent::ProjectUpdated {
                project_id: project,
                user_id: user,
            },
        );

        assert_eq!(cache.len(), 0);
    }
}
