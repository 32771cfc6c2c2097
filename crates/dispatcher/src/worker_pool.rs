use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use scaffolder_config::PoolConfig;
use scaffolder_domain::{TaskOutcome, WorkerReply, WorkerRequest};
use scaffolder_errors::{PoolError, PoolResult};
use scaffolder_worker::{WorkerEnvelope, WorkerSpawner};

/// 池中一个Worker的登记信息
struct WorkerRecord {
    id: String,
    sender: mpsc::Sender<WorkerEnvelope>,
    abort: AbortHandle,
    busy: bool,
    tasks_completed: u64,
    tasks_failed: u64,
    last_activity: Instant,
}

impl WorkerRecord {
    fn is_alive(&self) -> bool {
        !self.sender.is_closed() && !self.abort.is_finished()
    }
}

#[derive(Default)]
struct PoolState {
    // 按创建顺序排列，`acquire` 总是取第一个空闲的
    workers: Vec<WorkerRecord>,
    next_seq: u64,
    closed: bool,
}

impl PoolState {
    fn find_mut(&mut self, worker_id: &str) -> Option<&mut WorkerRecord> {
        self.workers.iter_mut().find(|w| w.id == worker_id)
    }

    fn take(&mut self, worker_id: &str) -> Option<WorkerRecord> {
        let index = self.workers.iter().position(|w| w.id == worker_id)?;
        Some(self.workers.remove(index))
    }

    fn claim_idle(&mut self) -> Option<AcquiredWorker> {
        let record = self.workers.iter_mut().find(|w| !w.busy && w.is_alive())?;
        record.busy = true;
        record.last_activity = Instant::now();
        Some(AcquiredWorker {
            id: record.id.clone(),
            sender: record.sender.clone(),
        })
    }
}

/// 已被标记为忙碌的Worker，持有者负责之后 `release`、`remove` 或 `terminate`
#[derive(Clone)]
pub struct AcquiredWorker {
    id: String,
    sender: mpsc::Sender<WorkerEnvelope>,
}

impl AcquiredWorker {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 发送请求并返回该请求专属的回复通道
    pub async fn dispatch(
        &self,
        request: WorkerRequest,
    ) -> PoolResult<oneshot::Receiver<WorkerReply>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(WorkerEnvelope { request, reply_tx })
            .await
            .map_err(|_| PoolError::WorkerCrashed {
                worker_id: self.id.clone(),
            })?;
        Ok(reply_rx)
    }
}

/// 归还Worker时累加到其计数器上的单项结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTally {
    pub completed: u64,
    pub failed: u64,
}

impl TaskTally {
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut tally, outcome| {
            if outcome.success {
                tally.completed += 1;
            } else {
                tally.failed += 1;
            }
            tally
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub busy: bool,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub idle_for: Duration,
}

/// Worker池
///
/// 所有对Worker表的修改都经过同一把异步锁。每个Worker有一个监督任务，
/// 在其退出或panic后把它从表中移除，不会自动补充。
pub struct WorkerPool {
    config: PoolConfig,
    spawner: Arc<dyn WorkerSpawner>,
    state: Arc<Mutex<PoolState>>,
    available: Arc<Notify>,
}

impl WorkerPool {
    /// 创建池并启动初始Worker，第一个Worker创建失败时返回错误
    pub async fn initialize(config: PoolConfig, spawner: Arc<dyn WorkerSpawner>) -> PoolResult<Self> {
        config
            .validate()
            .map_err(|e| PoolError::config_error(e.to_string()))?;

        let initial = config.initial_workers.min(config.max_workers).max(1);
        let pool = Self {
            config,
            spawner,
            state: Arc::new(Mutex::new(PoolState::default())),
            available: Arc::new(Notify::new()),
        };

        {
            let mut state = pool.state.lock().await;
            pool.create_worker(&mut state).map_err(|e| {
                error!("创建首个Worker失败，Worker池无法初始化: {}", e);
                e
            })?;
            for _ in 1..initial {
                if let Err(e) = pool.create_worker(&mut state) {
                    warn!("初始化时创建Worker失败，已有 {} 个: {}", state.workers.len(), e);
                    break;
                }
            }
            info!(
                "Worker池初始化完成: {} 个Worker，上限 {}",
                state.workers.len(),
                pool.config.max_workers
            );
        }

        Ok(pool)
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// 获取一个空闲Worker
    ///
    /// 没有空闲Worker且未达上限时扩容；否则等待释放通知，并按轮询间隔重新检查，
    /// 超过等待时间后返回 `NoAvailableWorkers`。
    pub async fn acquire(&self) -> PoolResult<AcquiredWorker> {
        let started = Instant::now();
        let deadline = started + self.config.acquire_timeout();

        loop {
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(PoolError::ShuttingDown);
                }
                if let Some(worker) = state.claim_idle() {
                    return Ok(worker);
                }
                if state.workers.len() < self.config.max_workers {
                    match self.create_worker(&mut state) {
                        Ok(worker_id) => {
                            debug!("扩容Worker {}，当前 {} 个", worker_id, state.workers.len());
                            if let Some(worker) = state.claim_idle() {
                                return Ok(worker);
                            }
                        }
                        Err(e) => warn!("扩容Worker失败，继续等待空闲Worker: {}", e),
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(started).as_millis() as u64;
                warn!("等待 {}ms 后仍没有空闲Worker", waited_ms);
                return Err(PoolError::NoAvailableWorkers { waited_ms });
            }
            let wait = self.config.acquire_poll_interval().min(deadline - now);
            let _ = tokio::time::timeout(wait, self.available.notified()).await;
        }
    }

    /// 归还Worker，更新最后活动时间和计数器，并唤醒一个等待者
    pub async fn release(&self, worker_id: &str, tally: TaskTally) -> PoolResult<()> {
        {
            let mut state = self.state.lock().await;
            let record = state
                .find_mut(worker_id)
                .ok_or_else(|| PoolError::worker_not_found(worker_id))?;
            record.busy = false;
            record.last_activity = Instant::now();
            record.tasks_completed += tally.completed;
            record.tasks_failed += tally.failed;
        }
        self.available.notify_one();
        Ok(())
    }

    /// 从表中删除Worker，不终止其执行单元
    pub async fn remove(&self, worker_id: &str) -> bool {
        let removed = self.state.lock().await.take(worker_id).is_some();
        if removed {
            debug!("从池中移除Worker {}", worker_id);
            self.available.notify_one();
        }
        removed
    }

    /// 终止Worker的执行单元并从表中删除
    pub async fn terminate(&self, worker_id: &str) -> bool {
        let record = self.state.lock().await.take(worker_id);
        match record {
            Some(record) => {
                record.abort.abort();
                info!("已终止Worker {}", worker_id);
                self.available.notify_one();
                true
            }
            None => {
                debug!("Worker {} 已不在池中，无需终止", worker_id);
                false
            }
        }
    }

    /// 关闭池并终止所有Worker，返回被终止的数量
    ///
    /// 关闭后 `acquire` 一律返回 `ShuttingDown`。
    pub async fn terminate_all(&self) -> usize {
        let records = {
            let mut state = self.state.lock().await;
            state.closed = true;
            std::mem::take(&mut state.workers)
        };

        for record in &records {
            if record.abort.is_finished() {
                warn!("Worker {} 在终止前已经退出", record.id);
            }
            record.abort.abort();
            debug!("终止Worker {}", record.id);
        }
        self.available.notify_waiters();
        records.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        let total = state.workers.len();
        let busy = state.workers.iter().filter(|w| w.busy).count();
        PoolStatus {
            total,
            busy,
            idle: total - busy,
            max_workers: self.config.max_workers,
        }
    }

    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .workers
            .iter()
            .map(|w| WorkerSnapshot {
                id: w.id.clone(),
                busy: w.busy,
                tasks_completed: w.tasks_completed,
                tasks_failed: w.tasks_failed,
                idle_for: now.duration_since(w.last_activity),
            })
            .collect()
    }

    fn create_worker(&self, state: &mut PoolState) -> PoolResult<String> {
        state.next_seq += 1;
        let handle = self.spawner.spawn(&format!("worker-{}", state.next_seq))?;
        let (worker_id, sender, join) = handle.into_parts();
        let abort = join.abort_handle();
        self.supervise(worker_id.clone(), join);

        state.workers.push(WorkerRecord {
            id: worker_id.clone(),
            sender,
            abort,
            busy: false,
            tasks_completed: 0,
            tasks_failed: 0,
            last_activity: Instant::now(),
        });
        Ok(worker_id)
    }

    fn supervise(&self, worker_id: String, join: JoinHandle<()>) {
        let state = Arc::clone(&self.state);
        let available = Arc::clone(&self.available);

        tokio::spawn(async move {
            match join.await {
                Ok(()) => debug!("Worker {} 的执行循环已结束", worker_id),
                Err(e) if e.is_cancelled() => debug!("Worker {} 已被终止", worker_id),
                Err(e) => error!("Worker {} 发生panic: {}", worker_id, e),
            }

            let removed = state.lock().await.take(&worker_id).is_some();
            if removed {
                warn!("Worker {} 意外退出，已从池中移除", worker_id);
                available.notify_one();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffolder_testing_utils::{pool_config, FailingSpawner};
    use scaffolder_worker::{ExecutorRegistry, LocalWorkerSpawner};

    fn local_spawner() -> Arc<dyn WorkerSpawner> {
        Arc::new(LocalWorkerSpawner::new(Arc::new(ExecutorRegistry::with_defaults())))
    }

    #[tokio::test]
    async fn test_initialize_creates_initial_workers() {
        let mut config = pool_config(4);
        config.initial_workers = 2;
        let pool = WorkerPool::initialize(config, local_spawner()).await.unwrap();

        let status = pool.status().await;
        assert_eq!(status.total, 2);
        assert_eq!(status.idle, 2);
        assert_eq!(status.max_workers, 4);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_first_worker_cannot_be_created() {
        let spawner = Arc::new(FailingSpawner::after(0, local_spawner()));
        let result = WorkerPool::initialize(pool_config(2), spawner).await;
        assert!(matches!(result, Err(PoolError::WorkerSpawn(_))));
    }

    #[tokio::test]
    async fn test_later_spawn_failure_is_not_fatal() {
        let mut config = pool_config(3);
        config.initial_workers = 3;
        let spawner = Arc::new(FailingSpawner::after(1, local_spawner()));
        let pool = WorkerPool::initialize(config, spawner).await.unwrap();
        assert_eq!(pool.status().await.total, 1);
    }

    #[tokio::test]
    async fn test_acquire_prefers_idle_then_grows() {
        let pool = WorkerPool::initialize(pool_config(2), local_spawner()).await.unwrap();

        let first = pool.acquire().await.unwrap();
        assert_eq!(first.id(), "worker-1");
        let second = pool.acquire().await.unwrap();
        assert_eq!(second.id(), "worker-2");

        let status = pool.status().await;
        assert_eq!((status.total, status.busy, status.idle), (2, 2, 0));

        pool.release(first.id(), TaskTally::default()).await.unwrap();
        let again = pool.acquire().await.unwrap();
        assert_eq!(again.id(), "worker-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = WorkerPool::initialize(pool_config(1), local_spawner()).await.unwrap();
        let _held = pool.acquire().await.unwrap();

        let started = Instant::now();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::NoAvailableWorkers { .. })));
        assert!(started.elapsed() >= Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_wakes_waiter() {
        let pool = Arc::new(WorkerPool::initialize(pool_config(1), local_spawner()).await.unwrap());
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(250)).await;
        pool.release(held.id(), TaskTally { completed: 3, failed: 1 }).await.unwrap();

        let acquired = waiter.await.unwrap().unwrap();
        assert_eq!(acquired.id(), "worker-1");

        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot[0].tasks_completed, 3);
        assert_eq!(snapshot[0].tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_release_unknown_worker() {
        let pool = WorkerPool::initialize(pool_config(1), local_spawner()).await.unwrap();
        let result = pool.release("worker-99", TaskTally::default()).await;
        assert!(matches!(result, Err(PoolError::WorkerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_terminate_removes_worker_without_respawn() {
        let pool = WorkerPool::initialize(pool_config(2), local_spawner()).await.unwrap();
        assert!(pool.terminate("worker-1").await);
        assert!(!pool.terminate("worker-1").await);
        assert_eq!(pool.status().await.total, 0);

        // 下一次获取时才按需创建
        let worker = pool.acquire().await.unwrap();
        assert_eq!(worker.id(), "worker-2");
    }

    #[tokio::test]
    async fn test_terminate_all_closes_pool() {
        let mut config = pool_config(3);
        config.initial_workers = 3;
        let pool = WorkerPool::initialize(config, local_spawner()).await.unwrap();

        assert_eq!(pool.terminate_all().await, 3);
        assert_eq!(pool.status().await.total, 0);
        assert!(pool.is_closed().await);
        assert!(matches!(pool.acquire().await, Err(PoolError::ShuttingDown)));
    }

    #[test]
    fn test_tally_counts_outcomes() {
        let outcomes = vec![
            TaskOutcome::succeeded("a", serde_json::json!(1)),
            TaskOutcome::failed("b", "boom"),
            TaskOutcome::succeeded("c", serde_json::json!(2)),
        ];
        assert_eq!(
            TaskTally::from_outcomes(&outcomes),
            TaskTally { completed: 2, failed: 1 }
        );
    }
}
