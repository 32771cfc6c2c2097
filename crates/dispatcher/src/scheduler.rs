use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};

use scaffolder_config::{AppConfig, SchedulerConfig, ShutdownConfig};
use scaffolder_domain::{Batch, Task, TaskOutcome, WorkerReply, WorkerRequest};
use scaffolder_errors::{PoolError, PoolResult};
use scaffolder_worker::{ExecutorRegistry, LocalWorkerSpawner, WorkerSpawner};

use crate::active_tasks::ActiveTaskTable;
use crate::retry_service::RetryPolicy;
use crate::shutdown::{ShutdownController, ShutdownReport};
use crate::stats::{SchedulerStats, StatsCollector};
use crate::worker_pool::{AcquiredWorker, PoolStatus, TaskTally, WorkerPool};

/// 批次任务之间共享的调度状态
struct SchedulerInner {
    pool: Arc<WorkerPool>,
    active: ActiveTaskTable,
    stats: StatsCollector,
    retry: RetryPolicy,
    task_timeout: Duration,
    batch_size: usize,
}

/// 任务调度器
///
/// 把提交的任务按固定大小切分为批次，每个批次独立获取Worker、等待回复、
/// 超时或失败时按线性退避重试。结果按输入顺序返回，任一批次永久失败则整个提交失败。
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    controller: ShutdownController,
}

impl Scheduler {
    /// 使用本地tokio任务作为Worker
    pub async fn from_config(config: &AppConfig, registry: ExecutorRegistry) -> PoolResult<Self> {
        let spawner = Arc::new(LocalWorkerSpawner::new(Arc::new(registry)));
        Self::with_spawner(config, spawner).await
    }

    pub async fn with_spawner(
        config: &AppConfig,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> PoolResult<Self> {
        config
            .validate()
            .map_err(|e| PoolError::config_error(e.to_string()))?;
        let pool = WorkerPool::initialize(config.pool.clone(), spawner).await?;
        Ok(Self::new(
            Arc::new(pool),
            &config.scheduler,
            config.shutdown.clone(),
            config.observability.metrics_enabled,
        ))
    }

    pub fn new(
        pool: Arc<WorkerPool>,
        config: &SchedulerConfig,
        shutdown: ShutdownConfig,
        metrics_enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                pool,
                active: ActiveTaskTable::new(),
                stats: StatsCollector::new(metrics_enabled),
                retry: RetryPolicy::from_config(config),
                task_timeout: config.task_timeout(),
                batch_size: config.effective_batch_size(),
            }),
            controller: ShutdownController::new(shutdown),
        }
    }

    /// 提交一组任务并等待全部结果
    ///
    /// 空输入直接返回空结果，不会触碰Worker池。
    #[instrument(skip_all, fields(task_count = tasks.len()))]
    pub async fn submit(&self, tasks: Vec<Task>) -> PoolResult<Vec<TaskOutcome>> {
        if self.controller.is_shutdown() {
            return Err(PoolError::ShuttingDown);
        }
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let task_count = tasks.len();
        let batches = Batch::partition(tasks, self.inner.batch_size);
        for batch in &batches {
            self.inner.active.register(batch).await?;
        }
        info!("提交 {} 个任务，分为 {} 个批次", task_count, batches.len());

        let handles: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.run_batch(batch).await })
            })
            .collect();

        // 任一批次失败立即返回，其余批次继续在后台完成并自行清理
        let per_batch = try_join_all(handles.into_iter().map(|handle| async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(PoolError::Internal(format!("批次任务异常终止: {e}"))),
            }
        }))
        .await?;

        let outcomes: Vec<TaskOutcome> = per_batch.into_iter().flatten().collect();
        debug!("{} 个任务全部完成", outcomes.len());
        Ok(outcomes)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.stats.snapshot()
    }

    pub async fn pool_status(&self) -> PoolStatus {
        self.inner.pool.status().await
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.inner.pool
    }

    pub async fn active_batches(&self) -> usize {
        self.inner.active.len().await
    }

    pub fn is_accepting(&self) -> bool {
        !self.controller.is_shutdown()
    }

    /// 停止接收新任务，排空活跃批次后终止所有Worker
    #[instrument(skip_all)]
    pub async fn shutdown(&self) -> ShutdownReport {
        self.controller
            .shutdown(&self.inner.active, &self.inner.pool)
            .await
    }
}

impl SchedulerInner {
    async fn run_batch(&self, batch: Arc<Batch>) -> PoolResult<Vec<TaskOutcome>> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let worker = match self.pool.acquire().await {
                Ok(worker) => worker,
                Err(e) => {
                    self.active.finish(batch.id()).await;
                    if e.is_scheduling_failure() {
                        self.stats.record_worker_unavailable();
                    } else {
                        self.stats
                            .record_batch_failed(batch.len() as u64, started.elapsed());
                    }
                    error!("批次 {} 无法获取Worker: {}", batch.id(), e);
                    return Err(e);
                }
            };

            let deadline = Instant::now() + self.task_timeout;
            if let Err(e) = self
                .active
                .dispatched(&batch, worker.id(), attempts, deadline)
                .await
            {
                if let Err(release_err) = self.pool.release(worker.id(), TaskTally::default()).await {
                    debug!("归还Worker {} 失败: {}", worker.id(), release_err);
                }
                self.stats
                    .record_batch_failed(batch.len() as u64, started.elapsed());
                warn!("批次 {} 未能分发: {}", batch.id(), e);
                return Err(e);
            }
            debug!(
                "批次 {} ({}) 第 {} 次尝试，分发到Worker {}",
                batch.id(),
                batch.operation(),
                attempts,
                worker.id()
            );

            let failure = match self.attempt(&worker, &batch, deadline).await {
                Ok(outcomes) => {
                    self.active.finish(batch.id()).await;
                    let tally = TaskTally::from_outcomes(&outcomes);
                    self.stats
                        .record_batch_completed(tally.completed, tally.failed, started.elapsed());
                    debug!(
                        "批次 {} 完成: 成功 {}，失败 {}",
                        batch.id(),
                        tally.completed,
                        tally.failed
                    );
                    return Ok(outcomes);
                }
                Err(e) => e,
            };

            if !failure.is_retryable() || !self.retry.should_retry(attempts) {
                self.active.finish(batch.id()).await;
                self.stats
                    .record_batch_failed(batch.len() as u64, started.elapsed());
                error!("批次 {} 在 {} 次尝试后失败: {}", batch.id(), attempts, failure);
                return Err(PoolError::BatchFailed {
                    batch_id: batch.id().to_string(),
                    attempts,
                    last_error: failure.to_string(),
                });
            }
            if self.pool.is_closed().await {
                self.active.finish(batch.id()).await;
                self.stats
                    .record_batch_failed(batch.len() as u64, started.elapsed());
                warn!("批次 {} 第 {} 次尝试失败后调度器已关闭，放弃重试", batch.id(), attempts);
                return Err(PoolError::ShuttingDown);
            }

            let delay = self.retry.backoff(attempts);
            warn!(
                "批次 {} 第 {} 次尝试失败: {}，{:?} 后重试",
                batch.id(),
                attempts,
                failure,
                delay
            );
            self.stats.record_retry();
            self.active.retry_wait(batch.id()).await;
            sleep(delay).await;
        }
    }

    /// 单次尝试：发送请求并在截止时间前等待回复
    async fn attempt(
        &self,
        worker: &AcquiredWorker,
        batch: &Arc<Batch>,
        deadline: Instant,
    ) -> PoolResult<Vec<TaskOutcome>> {
        let worker_id = worker.id();
        let exchange = async {
            let reply_rx = worker.dispatch(WorkerRequest::new(Arc::clone(batch))).await?;
            reply_rx.await.map_err(|_| PoolError::WorkerCrashed {
                worker_id: worker_id.to_string(),
            })
        };

        match timeout_at(deadline, exchange).await {
            Ok(Ok(reply)) => {
                let tally = TaskTally::from_outcomes(&reply.data);
                if let Err(e) = self.pool.release(worker_id, tally).await {
                    debug!("归还Worker {} 失败: {}", worker_id, e);
                }
                accept_reply(batch, reply)
            }
            Ok(Err(e)) => {
                // 回复通道被关闭，Worker在处理途中退出
                self.pool.remove(worker_id).await;
                self.stats.record_worker_crash();
                Err(e)
            }
            Err(_) => {
                warn!(
                    "批次 {} 在Worker {} 上超过 {:?} 未回复，终止该Worker",
                    batch.id(),
                    worker_id,
                    self.task_timeout
                );
                self.pool.terminate(worker_id).await;
                self.stats.record_timeout();
                Err(PoolError::timeout_error(format!(
                    "批次 {} 超过 {:?} 未完成",
                    batch.id(),
                    self.task_timeout
                )))
            }
        }
    }
}

/// 校验回复与批次对应，不匹配的回复按瞬时失败处理
fn accept_reply(batch: &Batch, reply: WorkerReply) -> PoolResult<Vec<TaskOutcome>> {
    if reply.task_id != batch.id() {
        return Err(PoolError::task_execution(format!(
            "回复的关联ID {} 与批次 {} 不符",
            reply.task_id,
            batch.id()
        )));
    }
    if !reply.success {
        return Err(PoolError::task_execution(
            reply
                .error
                .unwrap_or_else(|| "Worker拒绝处理该批次".to_string()),
        ));
    }
    if reply.data.len() != batch.len() {
        return Err(PoolError::task_execution(format!(
            "批次 {} 有 {} 个任务，回复中只有 {} 个结果",
            batch.id(),
            batch.len(),
            reply.data.len()
        )));
    }
    Ok(reply.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffolder_domain::TaskKind;
    use serde_json::json;

    fn batch_of(n: usize) -> Batch {
        Batch::new(
            (0..n)
                .map(|i| Task::with_id(format!("t-{i}"), TaskKind::Render, json!({})))
                .collect(),
        )
    }

    fn outcomes(n: usize) -> Vec<TaskOutcome> {
        (0..n)
            .map(|i| TaskOutcome::succeeded(format!("t-{i}"), json!(i)))
            .collect()
    }

    #[test]
    fn test_accept_matching_reply() {
        let batch = batch_of(2);
        let reply = WorkerReply::completed(batch.id(), outcomes(2));
        assert_eq!(accept_reply(&batch, reply).unwrap().len(), 2);
    }

    #[test]
    fn test_reject_mismatched_correlation_id() {
        let batch = batch_of(1);
        let reply = WorkerReply::completed("other-batch", outcomes(1));
        let err = accept_reply(&batch, reply).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_reject_short_reply() {
        let batch = batch_of(3);
        let reply = WorkerReply::completed(batch.id(), outcomes(2));
        let err = accept_reply(&batch, reply).unwrap_err();
        assert!(matches!(err, PoolError::TaskExecution(_)));
    }

    #[tokio::test]
    async fn test_dispatch_into_closed_table_releases_worker_and_counts_failure() {
        let scheduler = Scheduler::from_config(&AppConfig::default(), ExecutorRegistry::with_defaults())
            .await
            .unwrap();
        scheduler.inner.active.close().await;

        let err = scheduler
            .inner
            .run_batch(Arc::new(batch_of(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::ShuttingDown));

        let status = scheduler.pool_status().await;
        assert_eq!((status.total, status.busy), (1, 0));
        let stats = scheduler.stats();
        assert_eq!((stats.batches_failed, stats.tasks_failed), (1, 2));
        assert_eq!(stats.worker_unavailable, 0);
    }

    #[test]
    fn test_rejected_reply_carries_worker_error() {
        let batch = batch_of(1);
        let reply = WorkerReply::rejected(batch.id(), "批次为空");
        let err = accept_reply(&batch, reply).unwrap_err();
        assert!(err.to_string().contains("批次为空"));
    }
}
