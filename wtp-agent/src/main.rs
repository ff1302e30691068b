//! WTP 执行代理
//!
//! 运行在远程执行机上：注册到服务端后，按固定间隔发送心跳并轮询
//! 命令队列，取到命令即通过本地运行器执行，执行完成上报结果。
//! 协作式拉取模型，代理只需出站连通。

mod client;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wtp_engine::{RunnerConfig, TestRunner};

use crate::client::AgentClient;

/// 执行代理 CLI 参数
#[derive(Parser, Debug)]
#[command(name = "wtp-agent")]
#[command(about = "WTP 执行代理 - 在本机执行服务端派发的 UI 测试", long_about = None)]
#[command(version)]
struct Args {
    /// 服务端地址 (例如: http://localhost:8000)
    #[arg(short, long)]
    server: String,

    /// 代理名称 (缺省自动生成)
    #[arg(short, long)]
    name: Option<String>,

    /// 本机 WebDriver 端点
    #[arg(long, default_value = "http://localhost:4444")]
    webdriver_url: String,

    /// 报告根目录
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// 心跳间隔 (秒)
    #[arg(long, default_value = "5")]
    heartbeat_interval: u64,

    /// 命令轮询间隔 (秒)
    #[arg(long, default_value = "2")]
    poll_interval: u64,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
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
                    "wtp_agent={level},wtp_engine={level},wtp_browser={level}",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| format!("agent-{}", &Uuid::new_v4().simple().to_string()[..8]));
    let hostname = hostname();

    info!("启动执行代理: {} ({})", name, hostname);
    info!("服务端地址: {}", args.server);

    // 代理侧运行器：不挂本地数据库，结果经上报由服务端落库；
    // 一次只执行一条命令，用例顺序执行
    let runner = TestRunner::new(RunnerConfig {
        reports_root: args.reports_dir.clone(),
        webdriver_url: args.webdriver_url.clone(),
        fanout: 1,
        ..Default::default()
    });

    let client = Arc::new(
        AgentClient::connect(&args.server, name, hostname, runner)
            .await
            .context("连接服务端失败")?,
    );

    // 心跳独立于命令执行，长任务执行期间代理仍保持存活
    let heartbeat = tokio::spawn({
        let client = Arc::clone(&client);
        let interval = Duration::from_secs(args.heartbeat_interval);
        async move { client.heartbeat_loop(interval).await }
    });

    let mut poll_timer = tokio::time::interval(Duration::from_secs(args.poll_interval));
    poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("进入轮询循环 (心跳 {}s / 轮询 {}s)", args.heartbeat_interval, args.poll_interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("收到退出信号，准备停机");
                break;
            }
            _ = poll_timer.tick() => {
                match client.poll().await {
                    Ok(Some(command)) => {
                        let outcome = client.execute(&command).await;
                        if let Err(e) = client.report(&outcome).await {
                            error!("上报命令 {} 结果失败: {}", command.id, e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("轮询命令失败: {}", e),
                }
            }
        }
    }

    heartbeat.abort();

    // 尽力而为的注销；非正常退出由服务端心跳超时兜底
    client.unregister().await;

    info!("执行代理已停止");
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
