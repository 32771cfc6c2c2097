use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::Batch;

/// 调度器发给Worker的请求，`task_id` 即批次的关联ID
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub task_id: String,
    pub batch: Arc<Batch>,
}

impl WorkerRequest {
    pub fn new(batch: Arc<Batch>) -> Self {
        Self {
            task_id: batch.id().to_string(),
            batch,
        }
    }
}

/// Worker对一个批次的唯一回复
///
/// 单个任务的失败放在 `data` 中；`success = false` 仅表示整批无法处理。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReply {
    pub task_id: String,
    pub success: bool,
    #[serde(default)]
    pub data: Vec<TaskOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerReply {
    pub fn completed(task_id: impl Into<String>, data: Vec<TaskOutcome>) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            data,
            error: None,
        }
    }

    pub fn rejected(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            data: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// 单个任务的结果 `{success, taskId, data | error}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub success: bool,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(task_id: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            task_id: task_id.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            task_id: task_id.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_shape() {
        let ok = TaskOutcome::succeeded("t-1", json!("rendered"));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "success": true, "taskId": "t-1", "data": "rendered" })
        );

        let failed = TaskOutcome::failed("t-2", "模板错误: 未闭合的标签");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "success": false, "taskId": "t-2", "error": "模板错误: 未闭合的标签" })
        );
    }

    #[test]
    fn test_rejected_reply_has_no_data() {
        let reply = WorkerReply::rejected("b-1", "空批次");
        assert!(!reply.success);
        assert!(reply.data.is_empty());
        assert_eq!(reply.error.as_deref(), Some("空批次"));
    }
}
