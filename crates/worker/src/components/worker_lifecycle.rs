use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scaffolder_domain::{WorkerReply, WorkerRequest};
use scaffolder_errors::{PoolError, PoolResult};

use super::task_execution::BatchExecutor;
use crate::executor_registry::ExecutorRegistry;

/// 发往Worker的一条消息：请求本身加上对应的回复通道
pub struct WorkerEnvelope {
    pub request: WorkerRequest,
    pub reply_tx: oneshot::Sender<WorkerReply>,
}

/// 独立执行单元
///
/// 只持有自己的接收端和只读执行器注册表，与调度器之间没有共享的可变状态。
pub struct Worker {
    executor: BatchExecutor,
}

impl Worker {
    pub fn new(worker_id: String, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            executor: BatchExecutor::new(worker_id, registry),
        }
    }

    /// 单一读取循环：一次处理一个批次，通道关闭后退出
    pub async fn run(self, mut receiver: mpsc::Receiver<WorkerEnvelope>) {
        let worker_id = self.executor.worker_id().to_string();
        debug!("Worker {} 启动", worker_id);

        while let Some(WorkerEnvelope { request, reply_tx }) = receiver.recv().await {
            let reply = self.executor.execute(&request).await;
            if reply_tx.send(reply).is_err() {
                warn!(
                    "Worker {} 的批次 {} 回复无人接收，调度器可能已超时放弃",
                    worker_id, request.task_id
                );
            }
        }

        debug!("Worker {} 通道已关闭，退出", worker_id);
    }
}

/// 已创建的执行单元句柄，交给Worker池管理
pub struct WorkerHandle {
    id: String,
    sender: mpsc::Sender<WorkerEnvelope>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn new(id: String, sender: mpsc::Sender<WorkerEnvelope>, join: JoinHandle<()>) -> Self {
        Self { id, sender, join }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn into_parts(self) -> (String, mpsc::Sender<WorkerEnvelope>, JoinHandle<()>) {
        (self.id, self.sender, self.join)
    }
}

/// 创建执行单元的接口，池通过它按需扩容
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, worker_id: &str) -> PoolResult<WorkerHandle>;
}

/// 在当前tokio运行时上以独立任务运行Worker
pub struct LocalWorkerSpawner {
    registry: Arc<ExecutorRegistry>,
    channel_capacity: usize,
}

impl LocalWorkerSpawner {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            registry,
            channel_capacity: 1,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }
}

impl WorkerSpawner for LocalWorkerSpawner {
    fn spawn(&self, worker_id: &str) -> PoolResult<WorkerHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::worker_spawn(format!("没有可用的tokio运行时: {e}")))?;

        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let worker = Worker::new(worker_id.to_string(), Arc::clone(&self.registry));
        let join = runtime.spawn(worker.run(receiver));

        info!("已创建Worker {}", worker_id);
        Ok(WorkerHandle::new(worker_id.to_string(), sender, join))
    }
}
