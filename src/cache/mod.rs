//! Cache layer (C8): polymorphic over `{get, set(ttl), invalidate(prefix),
//! metrics}`. Keys are the canonical form `"<dataset_id>:<branch_id>:<generation_date>"`.

pub mod memory;
pub mod remote;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Cumulative counters exposed read-only by every cache variant.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Option<Vec<u8>>;
    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Remove every key matching `"*:<suffix>"` (prefix here means the
    /// dataset-agnostic suffix `<branch_id>:<generation_date>`, per spec).
    async fn invalidate_suffix(&self, suffix: &str);

    fn metrics(&self) -> CacheMetrics;
}

/// Build the canonical cache key for a dataset.
pub fn cache_key(dataset_id: &str, branch_id: &str, generation_date: &str) -> String {
    format!("{dataset_id}:{branch_id}:{generation_date}")
}

/// Typed convenience wrapper over a `Cache` trait object.
pub async fn get<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let raw = cache.get_raw(key).await?;
    serde_json::from_slice(&raw).ok()
}

pub async fn set<T: Serialize + Sync>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    if let Ok(raw) = serde_json::to_vec(value) {
        cache.set_raw(key, raw, ttl).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_matches_canonical_form() {
        assert_eq!(cache_key("branch_summary", "centro", "20250110"), "branch_summary:centro:20250110");
    }
}
