//! 代理管理与远程派发命令

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;

use wtp_common::{AgentInfo, AgentStatus, RunSettings, TestCase, WorkSpec};
use wtp_fleet::{DispatchOutcome, DispatchTarget};

use super::print_run_report;

#[derive(Serialize)]
struct DispatchRequest {
    target: DispatchTarget,
    work: WorkSpec,
}

/// 列出代理 (available_only 时仅在线空闲代理)
pub async fn list(server_url: &str, available_only: bool) -> Result<()> {
    let path = if available_only {
        "/api/agents/available"
    } else {
        "/api/agents"
    };

    let agents: Vec<AgentInfo> = reqwest::Client::new()
        .get(format!("{}{}", server_url.trim_end_matches('/'), path))
        .send()
        .await
        .with_context(|| format!("请求服务端失败: {}", server_url))?
        .error_for_status()
        .context("服务端返回错误")?
        .json()
        .await
        .context("解析代理列表失败")?;

    if agents.is_empty() {
        println!("没有{}代理", if available_only { "可用" } else { "已注册" });
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<10}  {:<20}  {}",
        "ID".bold(),
        "名称".bold(),
        "状态".bold(),
        "最后心跳".bold(),
        "能力".bold()
    );
    for agent in agents {
        let status = match agent.status {
            AgentStatus::Online => "online".green(),
            AgentStatus::Busy => "busy".yellow(),
            AgentStatus::Offline => "offline".red(),
        };
        println!(
            "{:<36}  {:<16}  {:<10}  {:<20}  {}",
            agent.id,
            agent.name,
            status,
            agent.last_heartbeat.format("%Y-%m-%d %H:%M:%S"),
            agent.capabilities.join(",")
        );
    }

    Ok(())
}

/// 将用例派发到指定代理执行
pub async fn dispatch(
    server_url: &str,
    agent_name: &str,
    file: &Path,
    settings: RunSettings,
) -> Result<()> {
    let case = TestCase::from_yaml_file(file)
        .with_context(|| format!("加载用例文件失败: {}", file.display()))?;

    println!("派发用例 {} 到代理 {}", case.name.bold(), agent_name.bold());

    let request = DispatchRequest {
        target: DispatchTarget::Agent(agent_name.to_string()),
        work: WorkSpec::RunCase { case, settings },
    };

    let response = reqwest::Client::new()
        .post(format!("{}/api/dispatch", server_url.trim_end_matches('/')))
        .json(&request)
        .send()
        .await
        .with_context(|| format!("请求服务端失败: {}", server_url))?;

    if !response.status().is_success() {
        let detail = response.text().await.unwrap_or_default();
        bail!("派发被拒绝: {}", detail);
    }

    let outcome: DispatchOutcome = response.json().await.context("解析派发结果失败")?;

    match outcome {
        DispatchOutcome::Queued(command) => {
            println!("{}", "命令已入队".green());
            println!("  命令 ID: {}", command.id);
            println!("  状态查询: GET /api/commands/{}", command.id);
        }
        DispatchOutcome::Completed(bulk) => {
            for report in &bulk.reports {
                print_run_report(report);
            }
        }
    }

    Ok(())
}
