//! Single-process event bus (C9): synchronous delivery to subscribers in
//! registration order. A subscriber panic is caught and logged as
//! `subscriber_failed` rather than aborting delivery to the rest.
//!
//! No direct precedent in the imitated codebase; grounded in the same
//! `Arc<dyn Trait>`-registry shape used for `MailGateway`/`ObjectStore`.

use crate::cache::Cache;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Payload carried by `dataset.invalidated`, the only event this system
/// defines today.
#[derive(Debug, Clone)]
pub struct DatasetInvalidated {
    pub generation_date: String,
    pub branch_id: String,
}

pub trait DatasetInvalidatedSubscriber: Send + Sync {
    fn on_dataset_invalidated(&self, event: &DatasetInvalidated);
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Box<dyn DatasetInvalidatedSubscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Box<dyn DatasetInvalidatedSubscriber>) {
        self.subscribers.write().expect("event bus lock poisoned").push(subscriber);
    }

    pub fn publish_dataset_invalidated(&self, event: DatasetInvalidated) {
        let subscribers = self.subscribers.read().expect("event bus lock poisoned");
        for subscriber in subscribers.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                subscriber.on_dataset_invalidated(&event);
            }));
            if outcome.is_err() {
                log::error!(
                    "subscriber_failed: dataset.invalidated subscriber panicked for generation {} branch {}",
                    event.generation_date,
                    event.branch_id
                );
            }
        }
    }
}

/// The only production subscriber: invalidates the cache entries every
/// configured branch could have derived from the generation date that just
/// changed. Registered on the bus at startup so `sync_generation` only has
/// to publish, not know about the cache at all.
pub struct CacheInvalidationSubscriber {
    cache: Arc<dyn Cache>,
    branches: Vec<String>,
}

impl CacheInvalidationSubscriber {
    pub fn new(cache: Arc<dyn Cache>, branches: Vec<String>) -> Self {
        Self { cache, branches }
    }
}

impl DatasetInvalidatedSubscriber for CacheInvalidationSubscriber {
    fn on_dataset_invalidated(&self, event: &DatasetInvalidated) {
        let cache = self.cache.clone();
        let branches = self.branches.clone();
        let generation_date = event.generation_date.clone();
        tokio::spawn(async move {
            for branch in branches {
                cache.invalidate_suffix(&format!("{branch}:{generation_date}")).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSubscriber(Arc<AtomicUsize>);
    impl DatasetInvalidatedSubscriber for CountingSubscriber {
        fn on_dataset_invalidated(&self, _event: &DatasetInvalidated) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingSubscriber;
    impl DatasetInvalidatedSubscriber for PanickingSubscriber {
        fn on_dataset_invalidated(&self, _event: &DatasetInvalidated) {
            panic!("boom");
        }
    }

    #[test]
    fn delivers_to_all_subscribers_in_registration_order() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Box::new(CountingSubscriber(count.clone())));
        bus.subscribe(Box::new(CountingSubscriber(count.clone())));

        bus.publish_dataset_invalidated(DatasetInvalidated {
            generation_date: "20250110".to_string(),
            branch_id: "centro".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_block_later_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Box::new(PanickingSubscriber));
        bus.subscribe(Box::new(CountingSubscriber(count.clone())));

        bus.publish_dataset_invalidated(DatasetInvalidated {
            generation_date: "20250110".to_string(),
            branch_id: "centro".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_invalidation_subscriber_clears_every_configured_branch() {
        use crate::cache::memory::InMemoryCache;
        use std::time::Duration;

        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        cache
            .set_raw("branch_summary:centro:20250110", b"1".to_vec(), Duration::from_secs(60))
            .await;
        cache
            .set_raw("branch_summary:norte:20250110", b"2".to_vec(), Duration::from_secs(60))
            .await;

        let bus = EventBus::new();
        bus.subscribe(Box::new(CacheInvalidationSubscriber::new(
            cache.clone(),
            vec!["centro".to_string(), "norte".to_string()],
        )));
        bus.publish_dataset_invalidated(DatasetInvalidated {
            generation_date: "20250110".to_string(),
            branch_id: "centro".to_string(),
        });

        // the subscriber invalidates on a spawned task; yield until it runs.
        for _ in 0..50 {
            if cache.get_raw("branch_summary:centro:20250110").await.is_none()
                && cache.get_raw("branch_summary:norte:20250110").await.is_none()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(cache.get_raw("branch_summary:centro:20250110").await, None);
        assert_eq!(cache.get_raw("branch_summary:norte:20250110").await, None);
    }
}
