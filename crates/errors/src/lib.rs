use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("没有可用的Worker: 等待 {waited_ms}ms 后超时")]
    NoAvailableWorkers { waited_ms: u64 },
    #[error("创建Worker失败: {0}")]
    WorkerSpawn(String),
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("Worker {worker_id} 异常退出")]
    WorkerCrashed { worker_id: String },
    #[error("批次 {batch_id} 在 {attempts} 次尝试后永久失败: {last_error}")]
    BatchFailed {
        batch_id: String,
        attempts: u32,
        last_error: String,
    },
    #[error("任务执行错误: {0}")]
    TaskExecution(String),
    #[error("无效的任务负载: {0}")]
    InvalidPayload(String),
    #[error("不支持的任务类型: {0}")]
    UnsupportedTaskKind(String),
    #[error("模板错误: {0}")]
    Template(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("调度器正在关闭，拒绝新的提交")]
    ShuttingDown,
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

impl PoolError {
    pub fn worker_spawn<S: Into<String>>(msg: S) -> Self {
        Self::WorkerSpawn(msg.into())
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn task_execution<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }
    pub fn invalid_payload<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPayload(msg.into())
    }
    pub fn template<S: Into<String>>(msg: S) -> Self {
        Self::Template(msg.into())
    }
    pub fn timeout_error<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PoolError::WorkerSpawn(_) | PoolError::Configuration(_) | PoolError::Internal(_)
        )
    }
    /// 批次级的瞬时失败，调度器会按退避策略重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::Timeout(_) | PoolError::WorkerCrashed { .. } | PoolError::TaskExecution(_)
        )
    }
    /// 调度失败（池已耗尽），与任务执行失败区分开，不会自动重试
    pub fn is_scheduling_failure(&self) -> bool {
        matches!(self, PoolError::NoAvailableWorkers { .. })
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for PoolError {
    fn from(err: anyhow::Error) -> Self {
        PoolError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
