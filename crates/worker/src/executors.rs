use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use scaffolder_domain::{Task, TaskKind};
use scaffolder_errors::{PoolError, PoolResult};

use crate::collaborators::{
    JinjaRenderer, PipelineTransformer, RuleValidator, TemplateRenderer, TransformSpec,
    Transformer, ValidationRules, Validator,
};

/// 单一任务类型的执行器
///
/// 返回的 `Err` 只影响当前任务，不会中断同批次的其它任务。
/// 同步或CPU密集的工作应通过 [`run_blocking`] 执行，否则超时终止无法让出运行时线程。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn kind(&self) -> TaskKind;

    fn name(&self) -> &str;

    async fn execute(&self, task: &Task) -> PoolResult<Value>;
}

/// 在阻塞线程池上运行同步的执行逻辑
///
/// 调用方被中止时只丢弃结果，已开始的同步计算会在阻塞线程上跑完，不占用运行时的工作线程。
/// 同步逻辑中的panic在调用方重新抛出，由批次执行器统一捕获。
pub async fn run_blocking<T, F>(work: F) -> PoolResult<T>
where
    F: FnOnce() -> PoolResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(PoolError::Internal(format!("阻塞任务被取消: {e}"))),
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(task: &Task) -> PoolResult<T> {
    serde_json::from_value(task.payload().clone()).map_err(|e| {
        PoolError::invalid_payload(format!("解析{}任务负载失败: {e}", task.kind()))
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPayload {
    pub template: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatePayload {
    pub input: Value,
    #[serde(default)]
    pub rules: ValidationRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformPayload {
    pub content: String,
    #[serde(default)]
    pub spec: TransformSpec,
}

/// 模板渲染执行器
pub struct RenderExecutor {
    renderer: Arc<dyn TemplateRenderer>,
}

impl RenderExecutor {
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { renderer }
    }
}

impl Default for RenderExecutor {
    fn default() -> Self {
        Self::new(Arc::new(JinjaRenderer::new()))
    }
}

#[async_trait]
impl TaskExecutor for RenderExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Render
    }

    fn name(&self) -> &str {
        "jinja"
    }

    async fn execute(&self, task: &Task) -> PoolResult<Value> {
        let payload: RenderPayload = parse_payload(task)?;
        debug!("渲染模板: task_id={}, 长度={}", task.id(), payload.template.len());
        let renderer = Arc::clone(&self.renderer);
        let rendered =
            run_blocking(move || renderer.render(&payload.template, &payload.context)).await?;
        Ok(Value::String(rendered))
    }
}

/// 输入校验执行器，结果为 `{valid, errors, warnings, score}`
pub struct ValidateExecutor {
    validator: Arc<dyn Validator>,
}

impl ValidateExecutor {
    pub fn new(validator: Arc<dyn Validator>) -> Self {
        Self { validator }
    }
}

impl Default for ValidateExecutor {
    fn default() -> Self {
        Self::new(Arc::new(RuleValidator::new()))
    }
}

#[async_trait]
impl TaskExecutor for ValidateExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Validate
    }

    fn name(&self) -> &str {
        "rules"
    }

    async fn execute(&self, task: &Task) -> PoolResult<Value> {
        let payload: ValidatePayload = parse_payload(task)?;
        let validator = Arc::clone(&self.validator);
        let report = run_blocking(move || validator.validate(&payload.input, &payload.rules)).await?;
        debug!(
            "校验完成: task_id={}, valid={}, score={}",
            task.id(),
            report.valid,
            report.score
        );
        Ok(serde_json::to_value(report)?)
    }
}

/// 内容变换执行器
pub struct TransformExecutor {
    transformer: Arc<dyn Transformer>,
}

impl TransformExecutor {
    pub fn new(transformer: Arc<dyn Transformer>) -> Self {
        Self { transformer }
    }
}

impl Default for TransformExecutor {
    fn default() -> Self {
        Self::new(Arc::new(PipelineTransformer::new()))
    }
}

#[async_trait]
impl TaskExecutor for TransformExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Transform
    }

    fn name(&self) -> &str {
        "pipeline"
    }

    async fn execute(&self, task: &Task) -> PoolResult<Value> {
        let payload: TransformPayload = parse_payload(task)?;
        let transformer = Arc::clone(&self.transformer);
        let transformed =
            run_blocking(move || transformer.transform(&payload.content, &payload.spec)).await?;
        Ok(Value::String(transformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_render_executor() {
        let task = Task::new(
            TaskKind::Render,
            json!({ "template": "name = \"{{name}}\"", "context": { "name": "demo" } }),
        );
        let data = RenderExecutor::default().execute(&task).await.unwrap();
        assert_eq!(data, json!("name = \"demo\""));
    }

    #[tokio::test]
    async fn test_validate_executor_returns_report() {
        let task = Task::new(
            TaskKind::Validate,
            json!({ "input": { "name": "demo" }, "rules": { "required": ["name", "version"] } }),
        );
        let data = ValidateExecutor::default().execute(&task).await.unwrap();
        assert_eq!(data["valid"], json!(false));
        assert_eq!(data["score"], json!(80));
        assert_eq!(data["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transform_executor() {
        let task = Task::new(
            TaskKind::Transform,
            json!({ "content": "MyService", "spec": { "steps": [{ "op": "case", "style": "kebab" }] } }),
        );
        let data = TransformExecutor::default().execute(&task).await.unwrap();
        assert_eq!(data, json!("my-service"));
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_result_and_panic() {
        let value = run_blocking(|| Ok(json!(42))).await.unwrap();
        assert_eq!(value, json!(42));

        let err = run_blocking::<Value, _>(|| Err(PoolError::template("坏模板"))).await.unwrap_err();
        assert!(matches!(err, PoolError::Template(_)));

        let panicked = tokio::spawn(run_blocking::<Value, _>(|| panic!("boom"))).await;
        assert!(panicked.unwrap_err().is_panic());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_invalid_payload_error() {
        let task = Task::new(TaskKind::Render, json!({ "context": {} }));
        let err = RenderExecutor::default().execute(&task).await.unwrap_err();
        assert!(matches!(err, PoolError::InvalidPayload(_)));
        assert!(err.to_string().contains("template"));
    }
}
