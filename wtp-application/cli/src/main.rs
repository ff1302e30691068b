//! WTP CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{agent, keywords, report, run};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "wtp")]
#[command(about = "WTP - Web UI 自动化测试平台", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 本地执行测试
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// 代理管理与远程派发
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// 运行记录管理
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// 列出支持的关键词
    Keywords,
}

#[derive(Subcommand)]
enum RunAction {
    /// 执行单个用例文件
    Case {
        /// 用例定义文件 (YAML)
        file: PathBuf,

        /// 相对 URL 前缀
        #[arg(long)]
        base_url: Option<String>,

        /// 浏览器引擎 (chromium/firefox/webkit)
        #[arg(long)]
        browser: Option<String>,

        /// 有头模式运行
        #[arg(long)]
        headed: bool,

        /// WebDriver 端点
        #[arg(long)]
        webdriver_url: Option<String>,

        /// 报告根目录
        #[arg(long)]
        reports_dir: Option<String>,

        /// 不写入数据库
        #[arg(long)]
        no_db: bool,
    },

    /// 执行目录下的全部用例文件
    Suite {
        /// 用例目录
        dir: PathBuf,

        /// 批量执行的最大并发数
        #[arg(long, default_value = "4")]
        fanout: usize,

        /// 相对 URL 前缀
        #[arg(long)]
        base_url: Option<String>,

        /// 浏览器引擎 (chromium/firefox/webkit)
        #[arg(long)]
        browser: Option<String>,

        /// 有头模式运行
        #[arg(long)]
        headed: bool,

        /// WebDriver 端点
        #[arg(long)]
        webdriver_url: Option<String>,

        /// 报告根目录
        #[arg(long)]
        reports_dir: Option<String>,

        /// 不写入数据库
        #[arg(long)]
        no_db: bool,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// 列出全部代理
    List {
        /// 服务端地址
        #[arg(long)]
        server: Option<String>,
    },

    /// 列出可用代理 (在线且空闲)
    Available {
        /// 服务端地址
        #[arg(long)]
        server: Option<String>,
    },

    /// 派发用例到指定代理
    Dispatch {
        /// 目标代理名称
        #[arg(long)]
        agent: String,

        /// 用例定义文件 (YAML)
        #[arg(long)]
        file: PathBuf,

        /// 服务端地址
        #[arg(long)]
        server: Option<String>,

        /// 相对 URL 前缀
        #[arg(long)]
        base_url: Option<String>,

        /// 浏览器引擎
        #[arg(long)]
        browser: Option<String>,

        /// 有头模式运行
        #[arg(long)]
        headed: bool,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// 列出运行记录
    List {
        /// 按用例 ID 过滤
        #[arg(long)]
        case_id: Option<i64>,

        /// 最多显示条数
        #[arg(long, default_value = "20")]
        limit: i64,

        /// 数据库路径
        #[arg(long)]
        db: Option<String>,
    },

    /// 显示单次运行详情 (含日志)
    Show {
        /// 运行 ID
        run_id: i64,

        /// 数据库路径
        #[arg(long)]
        db: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let config = CliConfig::load()?;

    match cli.command {
        Commands::Run { action } => match action {
            RunAction::Case {
                file,
                base_url,
                browser,
                headed,
                webdriver_url,
                reports_dir,
                no_db,
            } => {
                let options = run::RunOptions::from_config(
                    &config,
                    base_url,
                    browser,
                    headed,
                    webdriver_url,
                    reports_dir,
                    no_db,
                )?;
                run::run_case(&file, options).await
            }
            RunAction::Suite {
                dir,
                fanout,
                base_url,
                browser,
                headed,
                webdriver_url,
                reports_dir,
                no_db,
            } => {
                let mut options = run::RunOptions::from_config(
                    &config,
                    base_url,
                    browser,
                    headed,
                    webdriver_url,
                    reports_dir,
                    no_db,
                )?;
                options.fanout = fanout;
                run::run_suite(&dir, options).await
            }
        },

        Commands::Agent { action } => match action {
            AgentAction::List { server } => {
                agent::list(&server.unwrap_or(config.server_url), false).await
            }
            AgentAction::Available { server } => {
                agent::list(&server.unwrap_or(config.server_url), true).await
            }
            AgentAction::Dispatch {
                agent: agent_name,
                file,
                server,
                base_url,
                browser,
                headed,
            } => {
                let settings = run::build_settings(&config, base_url, browser, headed)?;
                agent::dispatch(
                    &server.unwrap_or_else(|| config.server_url.clone()),
                    &agent_name,
                    &file,
                    settings,
                )
                .await
            }
        },

        Commands::Report { action } => match action {
            ReportAction::List { case_id, limit, db } => {
                report::list(&db.unwrap_or_else(|| config.db_path.clone()), case_id, limit).await
            }
            ReportAction::Show { run_id, db } => {
                report::show(&db.unwrap_or_else(|| config.db_path.clone()), run_id).await
            }
        },

        Commands::Keywords => {
            keywords::list();
            Ok(())
        }
    }
}
