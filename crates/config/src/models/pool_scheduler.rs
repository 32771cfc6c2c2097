use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 主机CPU数减一，至少为1
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub max_workers: usize,
    /// 初始化时创建的Worker数量，第一个创建失败即为致命错误
    pub initial_workers: usize,
    pub acquire_timeout_ms: u64,
    pub acquire_poll_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            initial_workers: 1,
            acquire_timeout_ms: 5_000,
            acquire_poll_interval_ms: 100,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("最大Worker数必须大于0"));
        }
        if self.initial_workers == 0 {
            return Err(anyhow::anyhow!("初始Worker数必须大于0"));
        }
        if self.initial_workers > self.max_workers {
            return Err(anyhow::anyhow!(
                "初始Worker数 {} 不能超过最大Worker数 {}",
                self.initial_workers,
                self.max_workers
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(anyhow::anyhow!("获取Worker的等待超时必须大于0"));
        }
        if self.acquire_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("获取Worker的轮询间隔必须大于0"));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn acquire_poll_interval(&self) -> Duration {
        Duration::from_millis(self.acquire_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub task_timeout_ms: u64,
    pub retry_attempts: u32,
    /// 线性退避基数：第n次重试前等待 `retry_backoff_ms * n`
    pub retry_backoff_ms: u64,
    pub enable_batching: bool,
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: 30_000,
            retry_attempts: 3,
            retry_backoff_ms: 1_000,
            enable_batching: true,
            batch_size: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_timeout_ms == 0 {
            return Err(anyhow::anyhow!("任务超时时间必须大于0"));
        }
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("批大小必须大于0"));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// 实际生效的批大小，关闭批处理时每批一个任务
    pub fn effective_batch_size(&self) -> usize {
        if self.enable_batching {
            self.batch_size.max(1)
        } else {
            1
        }
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    pub grace_period_ms: u64,
    pub drain_poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 10_000,
            drain_poll_interval_ms: 100,
        }
    }
}

impl ShutdownConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.drain_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("排空轮询间隔必须大于0"));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}
