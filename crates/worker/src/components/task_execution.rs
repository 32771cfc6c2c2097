use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, warn};

use scaffolder_domain::{Task, TaskOutcome, WorkerReply, WorkerRequest};
use scaffolder_errors::PoolError;

use crate::executor_registry::ExecutorRegistry;

/// 在Worker内部按顺序执行一个批次
///
/// 单个任务的错误和panic都在这里被捕获并写入结果，整批只在无法处理时才失败。
pub struct BatchExecutor {
    worker_id: String,
    registry: Arc<ExecutorRegistry>,
}

impl BatchExecutor {
    pub fn new(worker_id: String, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            worker_id,
            registry,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn execute(&self, request: &WorkerRequest) -> WorkerReply {
        let batch = &request.batch;
        if batch.is_empty() {
            warn!("Worker {} 收到空批次 {}", self.worker_id, request.task_id);
            return WorkerReply::rejected(&request.task_id, "批次为空");
        }
        if let Some(kind) = batch
            .tasks()
            .iter()
            .map(Task::kind)
            .find(|kind| !self.registry.contains(*kind))
        {
            error!(
                "Worker {} 无法处理批次 {}: 没有 {} 执行器",
                self.worker_id, request.task_id, kind
            );
            return WorkerReply::rejected(
                &request.task_id,
                PoolError::UnsupportedTaskKind(kind.to_string()).to_string(),
            );
        }

        let started = Instant::now();
        let mut results = Vec::with_capacity(batch.len());
        for task in batch.tasks() {
            results.push(self.execute_task(task).await);
            // 让出执行权，使超时终止能在任务之间生效
            tokio::task::yield_now().await;
        }

        debug!(
            "Worker {} 完成批次 {}: {} 个任务，用时 {:?}",
            self.worker_id,
            request.task_id,
            results.len(),
            started.elapsed()
        );
        WorkerReply::completed(&request.task_id, results)
    }

    async fn execute_task(&self, task: &Task) -> TaskOutcome {
        let Some(executor) = self.registry.get(task.kind()) else {
            return TaskOutcome::failed(
                task.id(),
                PoolError::UnsupportedTaskKind(task.kind().to_string()).to_string(),
            );
        };

        match AssertUnwindSafe(executor.execute(task)).catch_unwind().await {
            Ok(Ok(data)) => TaskOutcome::succeeded(task.id(), data),
            Ok(Err(e)) => {
                debug!("任务 {} 执行失败: {}", task.id(), e);
                TaskOutcome::failed(task.id(), e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("任务 {} 的执行器 '{}' panic: {}", task.id(), executor.name(), message);
                TaskOutcome::failed(
                    task.id(),
                    PoolError::task_execution(format!("执行器panic: {message}")).to_string(),
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知panic".to_string()
    }
}
