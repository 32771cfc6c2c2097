use std::sync::Mutex;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;

/// 调度统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    /// 所有终态批次的滚动平均耗时
    pub average_duration_ms: f64,
    pub retries: u64,
    pub timeouts: u64,
    pub worker_crashes: u64,
    pub worker_unavailable: u64,
}

impl SchedulerStats {
    fn terminal_batches(&self) -> u64 {
        self.batches_completed + self.batches_failed
    }

    fn fold_duration(&mut self, elapsed: Duration) {
        let n = self.terminal_batches() as f64;
        let sample = elapsed.as_secs_f64() * 1_000.0;
        self.average_duration_ms += (sample - self.average_duration_ms) / n;
    }
}

/// 统计收集器，同时可选地把计数写入 `metrics` 门面
pub struct StatsCollector {
    inner: Mutex<SchedulerStats>,
    metrics_enabled: bool,
}

impl StatsCollector {
    pub fn new(metrics_enabled: bool) -> Self {
        Self {
            inner: Mutex::new(SchedulerStats::default()),
            metrics_enabled,
        }
    }

    pub fn snapshot(&self) -> SchedulerStats {
        self.inner
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    /// 批次成功结束，`completed`/`failed` 是其中单个任务的结果
    pub fn record_batch_completed(&self, completed: u64, failed: u64, elapsed: Duration) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.tasks_completed += completed;
            stats.tasks_failed += failed;
            stats.batches_completed += 1;
            stats.fold_duration(elapsed);
        }
        if self.metrics_enabled {
            counter!("scaffolder_tasks_completed_total").increment(completed);
            counter!("scaffolder_tasks_failed_total").increment(failed);
            counter!("scaffolder_batches_total", "outcome" => "completed").increment(1);
            histogram!("scaffolder_batch_duration_seconds").record(elapsed.as_secs_f64());
        }
    }

    /// 批次永久失败，其中所有任务都计为失败
    pub fn record_batch_failed(&self, task_count: u64, elapsed: Duration) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.tasks_failed += task_count;
            stats.batches_failed += 1;
            stats.fold_duration(elapsed);
        }
        if self.metrics_enabled {
            counter!("scaffolder_tasks_failed_total").increment(task_count);
            counter!("scaffolder_batches_total", "outcome" => "failed").increment(1);
            histogram!("scaffolder_batch_duration_seconds").record(elapsed.as_secs_f64());
        }
    }

    pub fn record_retry(&self) {
        self.bump(|stats| stats.retries += 1, "scaffolder_batch_retries_total");
    }

    pub fn record_timeout(&self) {
        self.bump(|stats| stats.timeouts += 1, "scaffolder_batch_timeouts_total");
    }

    pub fn record_worker_crash(&self) {
        self.bump(|stats| stats.worker_crashes += 1, "scaffolder_worker_crashes_total");
    }

    pub fn record_worker_unavailable(&self) {
        self.bump(
            |stats| stats.worker_unavailable += 1,
            "scaffolder_worker_unavailable_total",
        );
    }

    fn bump(&self, update: impl FnOnce(&mut SchedulerStats), metric: &'static str) {
        if let Ok(mut stats) = self.inner.lock() {
            update(&mut stats);
        }
        if self.metrics_enabled {
            counter!(metric).increment(1);
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(false)
    }
}
