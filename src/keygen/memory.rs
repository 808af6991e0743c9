// SPDX-License-Identifier: Apache-2.0

//! In-process cache
//!
//! Every primitive runs under one mutex, so operations are atomic for all
//! callers sharing the instance. Nothing is shared across processes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use qore_core::EngineResult;

use super::cache::{CacheCapabilities, DistributedCache};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the live entries; expired entries are dropped first.
    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries)
    }

    /// Overwrites `key` unconditionally. Test helper for simulating other
    /// writers.
    pub fn set(&self, key: &str, value: &str) {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: None,
                },
            );
        });
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.with_entries(|entries| {
            entries
                .get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(Instant::now()))
        })
    }
}

#[async_trait]
impl DistributedCache for MemoryCache {
    fn capabilities(&self) -> CacheCapabilities {
        CacheCapabilities {
            atomic: true,
            ttl: true,
            distributed: false,
        }
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> EngineResult<bool> {
        Ok(self.with_entries(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
            true
        }))
    }

    async fn inc(&self, key: &str, step: i64) -> EngineResult<Option<i64>> {
        Ok(self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: None,
            });
            let current: i64 = entry.value.parse().ok()?;
            let next = current.checked_add(step)?;
            entry.value = next.to_string();
            Some(next)
        }))
    }

    async fn cas(&self, key: &str, old: &str, new: &str) -> EngineResult<bool> {
        Ok(self.with_entries(|entries| match entries.get_mut(key) {
            Some(entry) if entry.value == old => {
                entry.value = new.to_string();
                true
            }
            _ => false,
        }))
    }

    async fn cad(&self, key: &str, old: &str) -> EngineResult<bool> {
        Ok(self.with_entries(|entries| {
            if entries.get(key).is_some_and(|e| e.value == old) {
                entries.remove(key);
                return true;
            }
            false
        }))
    }

    async fn ncad(&self, key: &str, old: &str) -> EngineResult<bool> {
        Ok(self.with_entries(|entries| {
            if entries.get(key).is_some_and(|e| e.value != old) {
                entries.remove(key);
                return true;
            }
            false
        }))
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> EngineResult<()> {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self.with_entries(|entries| entries.get(key).map(|e| e.value.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_only_stores_missing_keys() {
        let cache = MemoryCache::new();
        assert!(cache.add("k", "a", None).await.unwrap());
        assert!(!cache.add("k", "b", None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn inc_rejects_non_integers() {
        let cache = MemoryCache::new();
        assert_eq!(cache.inc("n", 1).await.unwrap(), Some(1));
        assert_eq!(cache.inc("n", 4).await.unwrap(), Some(5));
        cache.set("n", "empty-placeholder");
        assert_eq!(cache.inc("n", 1).await.unwrap(), None);
        assert_eq!(cache.get("n").await.unwrap().as_deref(), Some("empty-placeholder"));
    }

    #[tokio::test]
    async fn compare_and_swap_keeps_ttl() {
        let cache = MemoryCache::new();
        cache.add("k", "a", Some(Duration::from_secs(60))).await.unwrap();
        assert!(!cache.cas("k", "x", "b").await.unwrap());
        assert!(cache.cas("k", "a", "b").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("b"));
        assert!(cache.ttl("k").is_some());
    }

    #[tokio::test]
    async fn conditional_deletes() {
        let cache = MemoryCache::new();
        cache.set("k", "a");
        assert!(!cache.cad("k", "b").await.unwrap());
        assert!(!cache.ncad("k", "a").await.unwrap());
        assert!(cache.ncad("k", "b").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "a");
        assert!(cache.cad("k", "a").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.add("k", "a", Some(Duration::from_millis(10))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.add("k", "b", None).await.unwrap());
    }
}
