//! In-process cache variant backed by `dashmap`, the same crate the C6
//! per-generation mutex set uses.

use crate::cache::{Cache, CacheMetrics};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                drop(self.entries.remove(key));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    async fn invalidate_suffix(&self, suffix: &str) {
        let marker = format!(":{suffix}");
        let victims: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().ends_with(&marker))
            .map(|entry| entry.key().clone())
            .collect();
        for key in victims {
            self.entries.remove(&key);
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = InMemoryCache::new();
        cache.set_raw("a:b:c", b"payload".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(cache.get_raw("a:b:c").await, Some(b"payload".to_vec()));
        assert_eq!(cache.metrics().writes, 1);
        assert_eq!(cache.metrics().hits, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = InMemoryCache::new();
        cache.set_raw("k", b"v".to_vec(), Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_raw("k").await, None);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[tokio::test]
    async fn invalidate_suffix_removes_matching_keys_only() {
        let cache = InMemoryCache::new();
        cache.set_raw("branch_summary:centro:20250110", b"1".to_vec(), Duration::from_secs(60)).await;
        cache.set_raw("upcoming_arrivals:centro:20250110", b"2".to_vec(), Duration::from_secs(60)).await;
        cache.set_raw("branch_summary:norte:20250110", b"3".to_vec(), Duration::from_secs(60)).await;

        cache.invalidate_suffix("centro:20250110").await;

        assert_eq!(cache.get_raw("branch_summary:centro:20250110").await, None);
        assert_eq!(cache.get_raw("upcoming_arrivals:centro:20250110").await, None);
        assert!(cache.get_raw("branch_summary:norte:20250110").await.is_some());
        assert_eq!(cache.metrics().invalidations, 2);
    }
}
