use std::path::Path;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use scaffolder::Application;
use scaffolder_config::{AppConfig, LogLevel, OutputFormat};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("scaffolder")
        .version(env!("CARGO_PKG_VERSION"))
        .about("并行模板渲染、校验与变换任务执行器")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，默认取配置文件中的值")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，默认取配置文件中的值")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("执行任务文件中的全部任务")
                .arg(
                    Arg::new("tasks")
                        .short('t')
                        .long("tasks")
                        .value_name("FILE")
                        .help("任务列表JSON文件")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("结果输出文件，默认输出到标准输出"),
                ),
        )
        .subcommand(Command::new("config").about("打印生效的配置"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path).context("加载配置失败")?;

    let log_level = match matches.get_one::<String>("log-level") {
        Some(level) => level.parse::<LogLevel>().map_err(anyhow::Error::msg)?,
        None => config.observability.log_level,
    };
    let log_format = match matches.get_one::<String>("log-format") {
        Some(format) => format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?,
        None => config.observability.log_format,
    };
    init_logging(log_level, log_format)?;

    match matches.subcommand() {
        Some(("run", run_matches)) => run(config, run_matches).await,
        Some(("config", _)) => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
        _ => Err(anyhow::anyhow!("未知的子命令")),
    }
}

async fn run(config: AppConfig, matches: &ArgMatches) -> Result<()> {
    let tasks_path = matches
        .get_one::<String>("tasks")
        .map(Path::new)
        .ok_or_else(|| anyhow::anyhow!("缺少 --tasks 参数"))?;
    let output = matches.get_one::<String>("output").map(Path::new);

    info!("启动scaffolder任务执行器");
    let app = Application::new(config).await?;

    let result = tokio::select! {
        result = app.run(tasks_path, output) => Some(result),
        _ = wait_for_shutdown_signal() => {
            warn!("收到关闭信号，停止等待任务结果");
            None
        }
    };

    let report = app.shutdown().await;
    if !report.drained {
        warn!("关闭时仍有 {} 个批次未完成", report.abandoned_batches);
    }

    match result {
        Some(Ok(summary)) => {
            info!(
                "运行结束: 共 {} 个任务，成功 {}，失败 {}，重试 {} 次，平均批次耗时 {:.1}ms",
                summary.total,
                summary.succeeded,
                summary.failed,
                summary.stats.retries,
                summary.stats.average_duration_ms
            );
            Ok(())
        }
        Some(Err(e)) => {
            error!("运行失败: {:#}", e);
            Err(e)
        }
        None => Err(anyhow::anyhow!("运行被信号中断")),
    }
}

/// 初始化日志系统，日志写到标准错误，标准输出留给任务结果
fn init_logging(log_level: LogLevel, log_format: OutputFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        OutputFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("初始化JSON日志格式失败")?,
        OutputFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("初始化Pretty日志格式失败")?,
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_run_requires_tasks() {
        let result = cli().try_get_matches_from(["scaffolder", "run"]);
        assert!(result.is_err());

        let matches = cli()
            .try_get_matches_from(["scaffolder", "run", "--tasks", "tasks.json", "--log-format", "json"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("log-format").map(String::as_str), Some("json"));
        let (name, run_matches) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(
            run_matches.get_one::<String>("tasks").map(String::as_str),
            Some("tasks.json")
        );
    }
}
