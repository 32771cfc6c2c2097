use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use scaffolder_domain::TaskKind;

use crate::executors::{RenderExecutor, TaskExecutor, TransformExecutor, ValidateExecutor};

/// 任务类型到执行器的显式注册表
///
/// 构建完成后以 `Arc` 只读共享给所有Worker。
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册渲染、校验、变换三个默认执行器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RenderExecutor::default()));
        registry.register(Arc::new(ValidateExecutor::default()));
        registry.register(Arc::new(TransformExecutor::default()));
        registry
    }

    /// 按执行器声明的类型注册，返回被替换的旧执行器
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) -> Option<Arc<dyn TaskExecutor>> {
        let kind = executor.kind();
        info!("注册执行器 '{}' 处理 {} 任务", executor.name(), kind);
        self.executors.insert(kind, executor)
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.executors.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|kind| self.executors.contains_key(kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
