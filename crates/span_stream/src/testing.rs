//! Helpers for tests that wait on asynchronous delivery.

use crate::error::CollectorError;
use crossbeam_utils::Backoff;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Blocks the calling thread until `condition` holds or `timeout` elapses.
///
/// Spins briefly, then backs off to short sleeps.
pub fn await_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> Result<(), CollectorError> {
    let deadline = Instant::now() + timeout;
    let backoff = Backoff::new();
    loop {
        if condition() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(CollectorError::Timeout(timeout));
        }
        if backoff.is_completed() {
            std::thread::sleep(Duration::from_millis(5));
        } else {
            backoff.snooze();
        }
    }
}

/// Async variant of [`await_until`]; yields to the runtime between checks.
pub async fn await_until_async(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> Result<(), CollectorError> {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| CollectorError::Timeout(timeout))
}

/// Installs a subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_await_until_sees_other_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.store(true, Ordering::Release);
        });

        await_until(Duration::from_secs(5), || flag.load(Ordering::Acquire)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_await_until_times_out() {
        let err = await_until(Duration::from_millis(30), || false).unwrap_err();
        assert_eq!(err, CollectorError::Timeout(Duration::from_millis(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_until_async_times_out() {
        let err = await_until_async(Duration::from_millis(50), || false)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::Timeout(_)));
    }

    #[test]
    fn test_init_test_logging_twice() {
        init_test_logging();
        init_test_logging();
    }
}
