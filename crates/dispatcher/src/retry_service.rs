use std::time::Duration;

use scaffolder_config::SchedulerConfig;

/// 批次重试策略
///
/// 第一次尝试之外最多再重试 `max_retries` 次，第n次重试前等待 `base_backoff * n`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.retry_attempts, config.backoff_for(1))
    }

    /// `attempts` 为已经完成的尝试次数（从1开始）
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    pub fn backoff(&self, attempts: u32) -> Duration {
        self.base_backoff.saturating_mul(attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_allows_four_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_backoff_is_linear_and_monotonic() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        let delays: Vec<_> = (1..=3).map(|n| policy.backoff(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_zero_retries_never_retries() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert!(!policy.should_retry(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = SchedulerConfig {
            retry_attempts: 2,
            retry_backoff_ms: 40,
            ..SchedulerConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy, RetryPolicy::new(2, Duration::from_millis(40)));
    }
}
