use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::value_objects::{BatchOperation, TaskKind};

/// 不可变的工作单元
///
/// 创建后不再修改；交给Worker时以 `Arc<Batch>` 共享只读视图。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: String,
    #[serde(rename = "operation")]
    kind: TaskKind,
    payload: Value,
}

impl Task {
    /// 创建任务并在提交时生成ID
    pub fn new(kind: TaskKind, payload: Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind, payload)
    }

    pub fn with_id(id: impl Into<String>, kind: TaskKind, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// 外部任务描述 `{id, operation, payload}`，`id` 可省略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    pub operation: TaskKind,
    #[serde(default)]
    pub payload: Value,
}

impl From<TaskDescriptor> for Task {
    fn from(descriptor: TaskDescriptor) -> Self {
        match descriptor.id {
            Some(id) if !id.trim().is_empty() => {
                Task::with_id(id, descriptor.operation, descriptor.payload)
            }
            _ => Task::new(descriptor.operation, descriptor.payload),
        }
    }
}

/// 一次派发给单个Worker的有序任务组
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    id: String,
    tasks: Vec<Task>,
}

impl Batch {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tasks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn operation(&self) -> BatchOperation {
        let mut kinds = self.tasks.iter().map(Task::kind);
        match kinds.next() {
            Some(first) if kinds.all(|k| k == first) => BatchOperation::Uniform(first),
            _ => BatchOperation::Mixed,
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    /// 按原始顺序切分为固定大小的批次
    pub fn partition(tasks: Vec<Task>, batch_size: usize) -> Vec<Arc<Batch>> {
        let batch_size = batch_size.max(1);
        let mut batches = Vec::with_capacity(tasks.len().div_ceil(batch_size));
        let mut current = Vec::with_capacity(batch_size);

        for task in tasks {
            current.push(task);
            if current.len() == batch_size {
                batches.push(Arc::new(Batch::new(std::mem::take(&mut current))));
            }
        }
        if !current.is_empty() {
            batches.push(Arc::new(Batch::new(current)));
        }
        batches
    }
}
