//! 并行任务执行核心
//!
//! `WorkerPool` 管理Worker的创建、分配和回收；`Scheduler` 将任务切分为批次，
//! 分发到空闲Worker并处理超时、重试和结果汇总；`ShutdownController` 负责排空和终止。

pub mod active_tasks;
pub mod retry_service;
pub mod scheduler;
pub mod shutdown;
pub mod stats;
pub mod worker_pool;

pub use active_tasks::{ActiveTask, ActiveTaskTable};
pub use retry_service::RetryPolicy;
pub use scheduler::Scheduler;
pub use shutdown::{ShutdownController, ShutdownReport};
pub use stats::{SchedulerStats, StatsCollector};
pub use worker_pool::{AcquiredWorker, PoolStatus, TaskTally, WorkerPool, WorkerSnapshot};
