//! Test helper utilities and common testing patterns

use std::time::Duration;

use scaffolder_config::{AppConfig, PoolConfig};
use tokio::time::{sleep, Instant};

/// Pool limited to `max_workers`, one initial worker, default wait times
pub fn pool_config(max_workers: usize) -> PoolConfig {
    PoolConfig {
        max_workers,
        initial_workers: 1,
        acquire_timeout_ms: 5_000,
        acquire_poll_interval_ms: 100,
    }
}

/// Default configuration with the given pool size and batch size
pub fn app_config(max_workers: usize, batch_size: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.pool = pool_config(max_workers);
    config.scheduler.batch_size = batch_size;
    config
}

/// Like [`app_config`] with short timeouts for tests that wait on real time
pub fn fast_app_config(max_workers: usize, batch_size: usize) -> AppConfig {
    let mut config = app_config(max_workers, batch_size);
    config.pool.acquire_timeout_ms = 500;
    config.pool.acquire_poll_interval_ms = 10;
    config.scheduler.task_timeout_ms = 200;
    config.scheduler.retry_backoff_ms = 10;
    config.shutdown.grace_period_ms = 500;
    config.shutdown.drain_poll_interval_ms = 10;
    config
}

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    ///
    /// Uses the tokio clock, so it also works under a paused runtime.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        condition().await
    }
}
