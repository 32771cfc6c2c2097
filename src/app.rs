use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use scaffolder_config::AppConfig;
use scaffolder_dispatcher::{Scheduler, SchedulerStats, ShutdownReport};
use scaffolder_domain::{Task, TaskDescriptor, TaskOutcome};
use scaffolder_worker::ExecutorRegistry;
use serde::Serialize;
use tracing::{info, warn};

/// 一次运行的汇总
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stats: SchedulerStats,
}

impl RunSummary {
    fn new(outcomes: &[TaskOutcome], stats: SchedulerStats) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            stats,
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    scheduler: Scheduler,
}

impl Application {
    /// 创建调度器和Worker池
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!(
            "初始化应用程序: 最大Worker数 {}，批大小 {}，超时 {}ms",
            config.pool.max_workers,
            config.scheduler.effective_batch_size(),
            config.scheduler.task_timeout_ms
        );

        let scheduler = Scheduler::from_config(&config, ExecutorRegistry::with_defaults())
            .await
            .context("初始化Worker池失败")?;

        Ok(Self { config, scheduler })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 读取任务文件，执行并写出结果
    pub async fn run(&self, tasks_path: &Path, output: Option<&Path>) -> Result<RunSummary> {
        let tasks = load_tasks(tasks_path)?;
        info!("从 {} 读取了 {} 个任务", tasks_path.display(), tasks.len());

        let outcomes = self
            .scheduler
            .submit(tasks)
            .await
            .context("执行任务失败")?;
        write_outcomes(&outcomes, output)?;

        let summary = RunSummary::new(&outcomes, self.scheduler.stats());
        if summary.failed > 0 {
            warn!("{} 个任务中有 {} 个失败", summary.total, summary.failed);
        } else {
            info!("{} 个任务全部成功", summary.total);
        }
        Ok(summary)
    }

    pub async fn shutdown(&self) -> ShutdownReport {
        self.scheduler.shutdown().await
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取任务文件失败: {}", path.display()))?;
    parse_tasks(&content)
}

/// 解析 `[{id, operation, payload}, ...]`，缺少 `id` 时自动生成
pub fn parse_tasks(json: &str) -> Result<Vec<Task>> {
    let descriptors: Vec<TaskDescriptor> =
        serde_json::from_str(json).context("解析任务列表失败")?;
    Ok(descriptors.into_iter().map(Task::from).collect())
}

/// 写到指定文件，未指定时写到标准输出
pub fn write_outcomes(outcomes: &[TaskOutcome], output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(outcomes).context("序列化任务结果失败")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("写入结果文件失败: {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("写入标准输出失败")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffolder_domain::TaskKind;

    #[test]
    fn test_parse_tasks_accepts_aliases_and_missing_ids() {
        let tasks = parse_tasks(
            r#"[
                {"id": "a", "operation": "template", "payload": {"template": "x", "context": {}}},
                {"operation": "validate", "payload": {"input": {}, "rules": {}}},
                {"id": "", "operation": "transformation", "payload": {"content": "", "spec": {"steps": []}}}
            ]"#,
        )
        .unwrap();

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id(), "a");
        assert_eq!(tasks[1].kind(), TaskKind::Validate);
        assert!(!tasks[1].id().is_empty());
        assert!(!tasks[2].id().is_empty());
    }

    #[test]
    fn test_parse_tasks_rejects_unknown_operation() {
        let result = parse_tasks(r#"[{"operation": "compile", "payload": {}}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            TaskOutcome::succeeded("a", serde_json::json!(1)),
            TaskOutcome::failed("b", "boom"),
        ];
        let summary = RunSummary::new(&outcomes, SchedulerStats::default());
        assert_eq!((summary.total, summary.succeeded, summary.failed), (2, 1, 1));
    }
}
