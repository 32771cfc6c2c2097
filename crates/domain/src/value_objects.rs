use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use scaffolder_errors::PoolError;

/// 任务类型，封闭集合
///
/// 外部描述使用 `template` / `validation` / `transformation`，
/// 同时接受 `render` / `validate` / `transform` 作为别名。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "template", alias = "render")]
    Render,
    #[serde(rename = "validation", alias = "validate")]
    Validate,
    #[serde(rename = "transformation", alias = "transform")]
    Transform,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Render, TaskKind::Validate, TaskKind::Transform];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Render => "template",
            TaskKind::Validate => "validation",
            TaskKind::Transform => "transformation",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "template" | "render" => Ok(TaskKind::Render),
            "validation" | "validate" => Ok(TaskKind::Validate),
            "transformation" | "transform" => Ok(TaskKind::Transform),
            other => Err(PoolError::UnsupportedTaskKind(other.to_string())),
        }
    }
}

/// 批次的操作摘要，用于日志和统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Uniform(TaskKind),
    Mixed,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOperation::Uniform(kind) => write!(f, "{kind}"),
            BatchOperation::Mixed => f.write_str("mixed"),
        }
    }
}
