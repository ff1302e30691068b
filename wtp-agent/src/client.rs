//! 服务端通信客户端
//!
//! 代理只发起出站 HTTP 请求 (注册/心跳/轮询/上报/注销)，
//! 以兼容 NAT 之后仅出站连通的执行机。

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use wtp_common::{Command, CommandOutcome, RegisterRequest, RegisterResponse, TestCase};
use wtp_engine::TestRunner;

/// 代理客户端
///
/// 注册在构造时完成，agent_id 在生命周期内不变。
pub struct AgentClient {
    http: reqwest::Client,
    server_url: String,
    name: String,
    agent_id: Uuid,
    runner: TestRunner,
}

impl AgentClient {
    /// 连接服务端并完成注册
    ///
    /// 注册失败做有限次重试 (服务端暂不可达时)；名称冲突立即失败。
    pub async fn connect(
        server_url: &str,
        name: String,
        hostname: String,
        runner: TestRunner,
    ) -> Result<Self> {
        let server_url = server_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("构建 HTTP 客户端失败")?;

        let request = RegisterRequest {
            name: name.clone(),
            hostname,
            capabilities: vec!["webdriver".to_string(), "ui-testing".to_string()],
        };

        let mut last_error = None;
        for attempt in 1..=5 {
            match http
                .post(format!("{}/api/agents/register", server_url))
                .json(&request)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let body: RegisterResponse =
                        response.json().await.context("解析注册响应失败")?;
                    info!("代理已注册: {} ({})", name, body.agent_id);
                    return Ok(Self {
                        http,
                        server_url,
                        name,
                        agent_id: body.agent_id,
                        runner,
                    });
                }
                Ok(response) if response.status() == reqwest::StatusCode::CONFLICT => {
                    // 名称被存活代理占用，重试无意义
                    let detail = response.text().await.unwrap_or_default();
                    bail!("注册被拒绝 (名称冲突): {}", detail);
                }
                Ok(response) => {
                    warn!("注册失败 (HTTP {}), 第 {} 次尝试", response.status(), attempt);
                    last_error = Some(format!("HTTP {}", response.status()));
                }
                Err(e) => {
                    warn!("注册请求失败: {}, 第 {} 次尝试", e, attempt);
                    last_error = Some(e.to_string());
                }
            }

            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        bail!(
            "向 {} 注册代理失败: {}",
            server_url,
            last_error.unwrap_or_default()
        )
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 发送一次心跳
    pub async fn heartbeat(&self) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/api/agents/{}/heartbeat",
                self.server_url, self.agent_id
            ))
            .send()
            .await
            .context("心跳请求失败")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("服务端不认识此代理 (可能已重启)，请重启代理重新注册");
        }
        response.error_for_status().context("心跳被拒绝")?;
        Ok(())
    }

    /// 轮询待执行命令 (零或一条)
    pub async fn poll(&self) -> Result<Option<Command>> {
        let response = self
            .http
            .get(format!(
                "{}/api/agents/{}/commands",
                self.server_url, self.agent_id
            ))
            .send()
            .await
            .context("轮询请求失败")?
            .error_for_status()
            .context("轮询被拒绝")?;

        let command: Option<Command> = response.json().await.context("解析命令失败")?;
        Ok(command)
    }

    /// 通过本地运行器执行命令
    ///
    /// 命令载荷内的用例逐个执行 (代理侧不做并发扇出)，
    /// 聚合为一条命令结果。
    pub async fn execute(&self, command: &Command) -> CommandOutcome {
        info!("开始执行命令 {} ({:?})", command.id, command.kind);

        let label = command.work.label();
        let settings = command.work.settings().clone();
        let cases: Vec<TestCase> = command.work.cases().into_iter().cloned().collect();

        let bulk = self.runner.run_bulk(&label, &cases, &settings).await;

        CommandOutcome {
            command_id: command.id,
            success: bulk.failed == 0,
            message: format!("{}: {}/{} 通过", label, bulk.passed, bulk.total),
            runs: bulk.reports,
        }
    }

    /// 上报命令结果
    pub async fn report(&self, outcome: &CommandOutcome) -> Result<()> {
        self.http
            .post(format!(
                "{}/api/agents/{}/report",
                self.server_url, self.agent_id
            ))
            .json(outcome)
            .send()
            .await
            .context("上报请求失败")?
            .error_for_status()
            .context("上报被拒绝")?;

        info!("命令 {} 结果已上报", outcome.command_id);
        Ok(())
    }

    /// 注销代理 (尽力而为，服务端超时兜底)
    pub async fn unregister(&self) {
        let result = self
            .http
            .post(format!(
                "{}/api/agents/{}/unregister",
                self.server_url, self.agent_id
            ))
            .send()
            .await;

        match result {
            Ok(_) => info!("代理 {} 已注销", self.agent_id),
            Err(e) => warn!("注销失败 (服务端将按心跳超时清理): {}", e),
        }
    }

    /// 心跳后台循环
    pub async fn heartbeat_loop(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.heartbeat().await {
                warn!("心跳失败: {}", e);
            }
        }
    }
}
