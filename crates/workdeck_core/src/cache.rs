//! Read-through listing cache seam.
//!
//! # Responsibility
//! - Define the cache contract services invalidate against.
//! - Provide the in-process TTL implementation and the key builders
//!   services and tests agree on.
//!
//! # Invariants
//! - The cache is purely a performance layer; every mutation must `forget`
//!   the keys whose producers read the mutated rows.
//! - Expired entries are never returned.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Cache contract. Values are serialized listings (JSON text).
pub trait Cache {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String, ttl: Duration);
    fn forget(&self, key: &str);
}

/// Reads through the cache: returns the cached value or produces, stores
/// and returns a fresh one.
pub fn remember<C, F, E>(cache: &C, key: &str, ttl: Duration, producer: F) -> Result<String, E>
where
    C: Cache + ?Sized,
    F: FnOnce() -> Result<String, E>,
{
    if let Some(value) = cache.get(key) {
        return Ok(value);
    }
    let value = producer()?;
    cache.put(key, value.clone(), ttl);
    Ok(value)
}

/// Default TTL for listing keys.
pub const LISTING_TTL: Duration = Duration::from_secs(3600);

/// Mutex-guarded in-process cache with per-entry TTL.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(key) {
            Some((expires_at, value)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_string(), (Instant::now() + ttl, value));
    }

    fn forget(&self, key: &str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
    }
}

/// Key builders. Keys are named for the scope a producer reads, so
/// mutations can invalidate precisely.
pub mod keys {
    use super::Uuid;

    pub fn all_teams() -> String {
        "all_teams".to_string()
    }

    pub fn owner_teams(owner: Uuid) -> String {
        format!("owner_teams:{owner}")
    }

    pub fn all_projects() -> String {
        "all_projects".to_string()
    }

    pub fn owner_projects(owner: Uuid) -> String {
        format!("owner_projects:{owner}")
    }

    pub fn manager_projects(manager: Uuid) -> String {
        format!("manager_projects:{manager}")
    }

    pub fn completed_projects() -> String {
        "completed_projects".to_string()
    }

    pub fn completed_task_counts() -> String {
        "completed_task_counts".to_string()
    }

    pub fn all_tasks() -> String {
        "all_tasks".to_string()
    }

    pub fn owner_tasks(owner: Uuid) -> String {
        format!("owner_tasks:{owner}")
    }

    pub fn manager_tasks(manager: Uuid) -> String {
        format!("manager_tasks:{manager}")
    }

    pub fn member_tasks(member: Uuid) -> String {
        format!("member_tasks:{member}")
    }

    pub fn all_comments() -> String {
        "all_comments".to_string()
    }

    pub fn all_attachments() -> String {
        "all_attachments".to_string()
    }

    pub fn all_notifications() -> String {
        "all_notifications".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{remember, Cache, MemoryCache};
    use std::time::Duration;

    #[test]
    fn remember_produces_once_within_ttl() {
        let cache = MemoryCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let value = remember(&cache, "k", Duration::from_secs(60), || {
                calls += 1;
                Ok::<_, ()>("v".to_string())
            })
            .unwrap();
            assert_eq!(value, "v");
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn forget_drops_the_entry() {
        let cache = MemoryCache::new();
        cache.put("k", "v".to_string(), Duration::from_secs(60));
        cache.forget("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = MemoryCache::new();
        cache.put("k", "v".to_string(), Duration::from_millis(0));
        assert_eq!(cache.get("k"), None);
    }
}
