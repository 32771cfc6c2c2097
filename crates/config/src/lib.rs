pub mod models;

pub use models::{
    default_max_workers, AppConfig, LogLevel, ObservabilityConfig, OutputFormat, PoolConfig,
    SchedulerConfig, ShutdownConfig,
};
