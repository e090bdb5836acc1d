//! Remote key-value cache variant, speaking a generic REST surface
//! (same shape as `mail::oauth` and `storage::http_store`).

use crate::cache::{Cache, CacheMetrics};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct RemoteCache {
    http: reqwest::Client,
    base_url: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl RemoteCache {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            ..Default::default()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Cache for RemoteCache {
    async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let response = self.http.get(self.url(&format!("cache/{key}"))).send().await.ok()?;
        if !response.status().is_success() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(bytes.to_vec())
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let _ = self
            .http
            .put(self.url(&format!("cache/{key}")))
            .query(&[("ttl_seconds", ttl.as_secs().to_string())])
            .body(value)
            .send()
            .await;
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    async fn invalidate_suffix(&self, suffix: &str) {
        let _ = self
            .http
            .delete(self.url("cache"))
            .query(&[("suffix", suffix)])
            .send()
            .await;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
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
