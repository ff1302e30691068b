//! WTP 服务端
//!
//! 承载代理注册表、命令派发器与运行记录持久层的 HTTP 服务。

mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wtp_engine::{RunnerConfig, TestRunner};
use wtp_fleet::{spawn_sweeper, AgentRegistry, Dispatcher, RegistryConfig};
use wtp_storage::{Storage, StorageManager};

use crate::state::AppState;

/// 服务端 CLI 参数
#[derive(Parser, Debug)]
#[command(name = "wtp-server")]
#[command(about = "WTP 服务端 - Web UI 自动化测试平台", long_about = None)]
#[command(version)]
struct Args {
    /// 监听地址
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    listen: String,

    /// SQLite 数据库路径
    #[arg(long, default_value = "~/.config/wtp/wtp.db")]
    db: String,

    /// 报告根目录
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// 服务端本地执行使用的 WebDriver 端点
    #[arg(long, default_value = "http://localhost:4444")]
    webdriver_url: String,

    /// 心跳超时 (秒)，超过未收到心跳的代理降级为离线
    #[arg(long, default_value = "15")]
    heartbeat_timeout: u64,

    /// 存活扫描间隔 (秒)
    #[arg(long, default_value = "5")]
    sweep_interval: u64,

    /// 批量执行的最大并发数
    #[arg(long, default_value = "4")]
    fanout: usize,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "wtp_server={level},wtp_fleet={level},wtp_engine={level},wtp_storage={level},tower_http=warn",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("启动 WTP 服务端");

    // 持久层
    let manager = StorageManager::new(&args.db)
        .await
        .context("初始化数据库失败")?;
    let storage = Arc::new(Storage::from_manager(&manager));

    // 注册表与存活扫描
    let registry = Arc::new(AgentRegistry::new(RegistryConfig {
        heartbeat_timeout: Duration::from_secs(args.heartbeat_timeout),
        ..Default::default()
    }));
    let _sweeper = spawn_sweeper(
        Arc::clone(&registry),
        Duration::from_secs(args.sweep_interval),
    );

    // 本地执行器与派发器
    let runner = Arc::new(
        TestRunner::new(RunnerConfig {
            reports_root: args.reports_dir.clone(),
            webdriver_url: args.webdriver_url.clone(),
            fanout: args.fanout,
            ..Default::default()
        })
        .with_storage(Arc::clone(&storage)),
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), runner));

    let state = AppState::new(registry, dispatcher, storage);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("无法监听 {}", args.listen))?;
    info!("服务端已监听: http://{}", args.listen);

    axum::serve(listener, app).await.context("服务端异常退出")?;

    Ok(())
}
