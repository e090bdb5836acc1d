//! Shared retry/backoff helper for every external-call suspension point
//! (mail fetch, object-store upload/list/download, DB batch commit).
//!
//! Backoff parameters are fixed by the concurrency design: base 1s, factor
//! 2, jitter ±20%, cap 30s, max 5 attempts.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

const BASE: Duration = Duration::from_secs(1);
const FACTOR: u32 = 2;
const CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE.as_millis() as u64 * FACTOR.pow(attempt.saturating_sub(1)) as u64;
    let capped = exp.min(CAP.as_millis() as u64);
    let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (capped as f64 * (1.0 + jitter_fraction)).max(0.0) as u64;
    Duration::from_millis(jittered)
}

/// Retry `operation` up to `MAX_ATTEMPTS` times with exponential backoff,
/// returning the last error if every attempt fails.
pub async fn with_backoff<T, E, F, Fut>(mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                let delay = backoff_delay(attempt);
                log::warn!("retrying after attempt {attempt} failed, sleeping {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(|| {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err("permanent") }
        })
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn backoff_delay_is_capped() {
        for attempt in 1..10 {
            assert!(backoff_delay(attempt) <= CAP + CAP / 5);
        }
    }
}
