//! Async test helpers
//!
//! Timeout and polling utilities for tests that wait on replication
//! or reconciliation to take effect.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Assert a future completes within `duration` and return its output.
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

/// Poll `probe` every 25ms until it yields true, panicking after
/// `deadline`. Useful for "eventually" assertions against live nodes.
pub async fn wait_until<F, Fut>(deadline: Duration, what: &str, mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if probe().await {
            return;
        }
        if started.elapsed() > deadline {
            panic!("condition not reached within {:?}: {}", deadline, what);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_assert_completes_within() {
        let value = assert_completes_within(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_wait_until_eventually_true() {
        let counter = AtomicU32::new(0);
        wait_until(DEFAULT_TEST_TIMEOUT, "counter reaches three", || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { n >= 3 }
        })
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "condition not reached")]
    async fn test_wait_until_panics_on_deadline() {
        wait_until(Duration::from_millis(60), "never", || async { false }).await;
    }
}
