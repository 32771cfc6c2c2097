use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;

use scaffolder_domain::{Batch, BatchOperation};
use scaffolder_errors::{PoolError, PoolResult};

/// 正在执行或等待重试的批次
///
/// `worker_id` 为 `None` 表示批次处于退避等待中，没有占用Worker。
#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub task_id: String,
    pub operation: BatchOperation,
    pub batch: Arc<Batch>,
    pub started_at: Instant,
    pub worker_id: Option<String>,
    pub attempts: u32,
    pub deadline: Option<Instant>,
}

impl ActiveTask {
    pub fn new(batch: Arc<Batch>) -> Self {
        Self {
            task_id: batch.id().to_string(),
            operation: batch.operation(),
            batch,
            started_at: Instant::now(),
            worker_id: None,
            attempts: 0,
            deadline: None,
        }
    }
}

#[derive(Default)]
struct TableState {
    tasks: HashMap<String, ActiveTask>,
    closed: bool,
}

/// 活跃批次登记表，关闭后拒绝新的登记
#[derive(Default)]
pub struct ActiveTaskTable {
    state: RwLock<TableState>,
}

impl ActiveTaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新提交的批次，此时尚未分配Worker
    pub async fn register(&self, batch: &Arc<Batch>) -> PoolResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(PoolError::ShuttingDown);
        }
        state
            .tasks
            .insert(batch.id().to_string(), ActiveTask::new(Arc::clone(batch)));
        Ok(())
    }

    /// 记录一次分发：批次已被发往 `worker_id`，截止时间为 `deadline`
    pub async fn dispatched(
        &self,
        batch: &Arc<Batch>,
        worker_id: &str,
        attempts: u32,
        deadline: Instant,
    ) -> PoolResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(PoolError::ShuttingDown);
        }
        let entry = state
            .tasks
            .entry(batch.id().to_string())
            .or_insert_with(|| ActiveTask::new(Arc::clone(batch)));
        entry.worker_id = Some(worker_id.to_string());
        entry.attempts = attempts;
        entry.deadline = Some(deadline);
        Ok(())
    }

    /// 进入退避等待，批次不再占用Worker
    pub async fn retry_wait(&self, task_id: &str) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.tasks.get_mut(task_id) {
            entry.worker_id = None;
            entry.deadline = None;
        }
    }

    pub async fn finish(&self, task_id: &str) -> Option<ActiveTask> {
        self.state.write().await.tasks.remove(task_id)
    }

    pub async fn get(&self, task_id: &str) -> Option<ActiveTask> {
        self.state.read().await.tasks.get(task_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 正在占用的Worker ID
    pub async fn assigned_workers(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .filter_map(|task| task.worker_id.clone())
            .collect()
    }

    /// 关闭登记表并丢弃剩余条目，返回被丢弃的数量
    pub async fn close(&self) -> usize {
        let mut state = self.state.write().await;
        state.closed = true;
        let abandoned = state.tasks.len();
        state.tasks.clear();
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffolder_domain::{Task, TaskKind};
    use serde_json::json;

    fn batch() -> Arc<Batch> {
        Arc::new(Batch::new(vec![Task::new(TaskKind::Render, json!({}))]))
    }

    #[tokio::test]
    async fn test_dispatch_then_retry_wait() {
        let table = ActiveTaskTable::new();
        let batch = batch();

        table
            .dispatched(&batch, "worker-1", 1, Instant::now())
            .await
            .unwrap();
        assert_eq!(table.assigned_workers().await, vec!["worker-1".to_string()]);

        table.retry_wait(batch.id()).await;
        let task = table.get(batch.id()).await.unwrap();
        assert_eq!(task.worker_id, None);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.operation, BatchOperation::Uniform(TaskKind::Render));

        table
            .dispatched(&batch, "worker-2", 2, Instant::now())
            .await
            .unwrap();
        assert_eq!(table.get(batch.id()).await.unwrap().attempts, 2);
        assert_eq!(table.len().await, 1);

        assert!(table.finish(batch.id()).await.is_some());
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_registered_batch_counts_as_active() {
        let table = ActiveTaskTable::new();
        let batch = batch();
        table.register(&batch).await.unwrap();

        let task = table.get(batch.id()).await.unwrap();
        assert_eq!(task.attempts, 0);
        assert!(task.worker_id.is_none());
        assert!(table.assigned_workers().await.is_empty());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_closed_table_rejects_dispatch() {
        let table = ActiveTaskTable::new();
        let batch = batch();
        table
            .dispatched(&batch, "worker-1", 1, Instant::now())
            .await
            .unwrap();

        assert_eq!(table.close().await, 1);
        assert!(table.is_empty().await);
        let result = table.dispatched(&batch, "worker-1", 2, Instant::now()).await;
        assert!(matches!(result, Err(PoolError::ShuttingDown)));
        assert!(matches!(table.register(&batch).await, Err(PoolError::ShuttingDown)));
    }
}
