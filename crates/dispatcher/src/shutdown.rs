use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use scaffolder_config::ShutdownConfig;

use crate::active_tasks::ActiveTaskTable;
use crate::worker_pool::WorkerPool;

/// 一次关闭的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// 宽限期内所有活跃批次都已结束
    pub drained: bool,
    /// 宽限期结束时仍未完成而被丢弃的批次数
    pub abandoned_batches: usize,
    pub terminated_workers: usize,
    pub elapsed: Duration,
}

/// 优雅关闭控制器
///
/// 停止接收新的提交，在宽限期内等待活跃批次结束，然后终止所有Worker。
/// 只有第一次调用会执行。
pub struct ShutdownController {
    config: ShutdownConfig,
    is_shutdown: AtomicBool,
}

impl ShutdownController {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            is_shutdown: AtomicBool::new(false),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// 执行关闭流程，重复调用直接返回空报告
    pub async fn shutdown(&self, active: &ActiveTaskTable, pool: &WorkerPool) -> ShutdownReport {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            debug!("关闭流程已经触发过");
            return ShutdownReport::default();
        }

        let started = Instant::now();
        info!(
            "开始关闭，停止接收新任务，等待活跃批次完成（宽限期 {:?}）",
            self.config.grace_period()
        );

        let drained = self.drain(active, started + self.config.grace_period()).await;
        let abandoned_batches = active.close().await;
        if abandoned_batches > 0 {
            warn!("宽限期结束，放弃 {} 个未完成的批次", abandoned_batches);
        }

        let terminated_workers = pool.terminate_all().await;
        let report = ShutdownReport {
            drained,
            abandoned_batches,
            terminated_workers,
            elapsed: started.elapsed(),
        };
        info!(
            "关闭完成: 终止 {} 个Worker，耗时 {:?}",
            report.terminated_workers, report.elapsed
        );
        report
    }

    async fn drain(&self, active: &ActiveTaskTable, deadline: Instant) -> bool {
        loop {
            let remaining = active.len().await;
            if remaining == 0 {
                debug!("所有活跃批次已完成");
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            debug!("仍有 {} 个活跃批次，继续等待", remaining);
            sleep(self.config.drain_poll_interval().min(deadline - now)).await;
        }
    }
}
