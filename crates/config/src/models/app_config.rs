use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    logging::ObservabilityConfig,
    pool_scheduler::{PoolConfig, SchedulerConfig, ShutdownConfig},
};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/scaffolder.toml",
    "scaffolder.toml",
    "/etc/scaffolder/config.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub scheduler: SchedulerConfig,
    pub shutdown: ShutdownConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：TOML文件 → `SCAFFOLDER_` 环境变量覆盖
    ///
    /// 显式指定的路径必须存在；未指定时依次查找默认路径，都不存在则使用内置默认值。
    /// 环境变量以 `__` 分隔层级，例如 `SCAFFOLDER_SCHEDULER__BATCH_SIZE=8`。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCAFFOLDER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.scheduler.validate()?;
        self.shutdown.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
